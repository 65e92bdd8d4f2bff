// src/models/state.rs

//! Persisted cross-cycle state.
//!
//! ## Files
//!
//! ```text
//! {state_dir}/
//! ├── leg_status_state.json      # NotificationState for the leg monitor
//! ├── fault_status_state.json    # NotificationState for the fault monitor
//! ├── leg_alert_history.json     # AlertHistory
//! └── tracker_snapshot.json      # TrackerSnapshot
//! ```

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{AnomalyRecord, LegProgress};

/// Last successfully delivered content for one monitor kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationState {
    pub status_hash: String,
    pub timestamp: NaiveDateTime,
    pub date: NaiveDate,

    /// Caller-supplied extras (line count, monitored date, ...)
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl NotificationState {
    pub fn new(status_hash: impl Into<String>, metadata: Map<String, Value>, now: NaiveDateTime) -> Self {
        Self {
            status_hash: status_hash.into(),
            timestamp: now,
            date: now.date(),
            metadata,
        }
    }
}

/// When each stall alert was last sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertHistory {
    #[serde(default)]
    pub date: Option<NaiveDate>,

    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,

    #[serde(default)]
    pub alerts: BTreeMap<String, NaiveDateTime>,
}

/// Tracker state for resuming within the same day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub date: Option<NaiveDate>,

    #[serde(default)]
    pub aircraft: BTreeMap<String, Vec<LegProgress>>,

    #[serde(default)]
    pub anomalies: Vec<AnomalyRecord>,
}

// src/models/anomaly.rs

//! Anomaly (diversion) records.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of mismatch between an observed leg and the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    UnknownFlight,
    RouteMismatch,
    SameAirport,
}

impl AnomalyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownFlight => "unknown_flight",
            Self::RouteMismatch => "route_mismatch",
            Self::SameAirport => "same_airport",
        }
    }

    /// Human-readable label used in notifications.
    pub fn describe(self) -> &'static str {
        match self {
            Self::UnknownFlight => "检测到非计划航班",
            Self::RouteMismatch => "航线异常",
            Self::SameAirport => "起降机场相同",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detector output for one leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub original_route: String,
    pub actual_route: String,
    pub anomaly_airport: String,
}

/// Identifies the leg an anomaly was observed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegKey {
    pub aircraft: String,
    pub flight_number: String,
    pub date: NaiveDate,
}

/// An anomaly bound to its leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub leg: LegKey,
    #[serde(flatten)]
    pub anomaly: Anomaly,
}

impl AnomalyRecord {
    /// Warning line appended to an aircraft's status.
    pub fn warning(&self) -> String {
        format!(
            "⚠️ 提醒：原计划{}，系统显示{}，{}。",
            self.anomaly.original_route,
            self.anomaly.actual_route,
            self.anomaly.kind.describe()
        )
    }

    /// One-line event summary for the anomaly log.
    pub fn event_line(&self) -> String {
        format!(
            "⚠️ {} 异常事件：{} {}，原计划{}，实际执行{}，异常{}。",
            self.leg.aircraft,
            self.leg.flight_number,
            self.anomaly.kind.describe(),
            self.anomaly.original_route,
            self.anomaly.actual_route,
            self.anomaly.anomaly_airport
        )
    }
}

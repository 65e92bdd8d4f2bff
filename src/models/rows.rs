// src/models/rows.rs

//! Typed feed rows.
//!
//! The upstream tables use Chinese column headers; the serde aliases accept
//! those as well as the snake_case names written back by this crate. Every
//! column that may be blank or absent is an `Option`.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::utils::non_blank;
use crate::utils::time::parse_hhmm;

/// Rows that belong to one aircraft.
pub trait FeedRow {
    fn aircraft(&self) -> &str;
}

/// One flight-leg progress row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegRow {
    #[serde(alias = "机号")]
    pub aircraft: String,

    #[serde(alias = "航班号")]
    pub flight_number: String,

    #[serde(default, alias = "起飞机场")]
    pub departure_airport: Option<String>,

    #[serde(default, alias = "着陆机场")]
    pub arrival_airport: Option<String>,

    /// Pushback
    #[serde(default, alias = "OUT")]
    pub out: Option<String>,

    /// Takeoff
    #[serde(default, alias = "OFF")]
    pub off: Option<String>,

    /// Landing
    #[serde(default, alias = "ON")]
    pub on: Option<String>,

    /// Gate arrival
    #[serde(default, rename = "in", alias = "IN")]
    pub in_gate: Option<String>,
}

impl LegRow {
    pub fn out_time(&self) -> Option<NaiveTime> {
        self.out.as_deref().and_then(parse_hhmm)
    }

    pub fn off_time(&self) -> Option<NaiveTime> {
        self.off.as_deref().and_then(parse_hhmm)
    }

    pub fn on_time(&self) -> Option<NaiveTime> {
        self.on.as_deref().and_then(parse_hhmm)
    }

    pub fn in_time(&self) -> Option<NaiveTime> {
        self.in_gate.as_deref().and_then(parse_hhmm)
    }

    pub fn departure(&self) -> Option<&str> {
        non_blank(self.departure_airport.as_deref())
    }

    pub fn arrival(&self) -> Option<&str> {
        non_blank(self.arrival_airport.as_deref())
    }

    /// Timestamp columns that are populated but not `HH:MM`.
    pub fn malformed_columns(&self) -> Vec<&'static str> {
        [
            ("OUT", &self.out),
            ("OFF", &self.off),
            ("ON", &self.on),
            ("IN", &self.in_gate),
        ]
        .into_iter()
        .filter(|(_, value)| {
            non_blank(value.as_deref()).is_some_and(|v| parse_hhmm(v).is_none())
        })
        .map(|(name, _)| name)
        .collect()
    }
}

impl FeedRow for LegRow {
    fn aircraft(&self) -> &str {
        &self.aircraft
    }
}

/// Columns of a fault row that filter rules can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultColumn {
    Aircraft,
    FlightNumber,
    Description,
    TriggerTime,
    FaultType,
    Phase,
}

/// One fault report row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaultRow {
    #[serde(alias = "机号")]
    pub aircraft: String,

    #[serde(default, alias = "航班号")]
    pub flight_number: String,

    #[serde(default, alias = "描述")]
    pub description: String,

    #[serde(default, alias = "触发时间")]
    pub trigger_time: String,

    #[serde(default, alias = "故障类型")]
    pub fault_type: String,

    #[serde(default, alias = "飞行阶段")]
    pub phase: String,
}

impl FaultRow {
    pub fn column(&self, column: FaultColumn) -> &str {
        match column {
            FaultColumn::Aircraft => &self.aircraft,
            FaultColumn::FlightNumber => &self.flight_number,
            FaultColumn::Description => &self.description,
            FaultColumn::TriggerTime => &self.trigger_time,
            FaultColumn::FaultType => &self.fault_type,
            FaultColumn::Phase => &self.phase,
        }
    }
}

impl FeedRow for FaultRow {
    fn aircraft(&self) -> &str {
        &self.aircraft
    }
}

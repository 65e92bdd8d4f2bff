// src/models/flight.rs

//! Flight phases and per-leg lifecycle state.

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of one leg, derived from which timestamps are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightPhase {
    Scheduled,
    Pushback,
    Airborne,
    Landed,
    InGate,
}

impl FlightPhase {
    /// Precedence: IN_GATE > LANDED > AIRBORNE > PUSHBACK > SCHEDULED.
    pub fn derive(out: bool, off: bool, on: bool, in_gate: bool) -> Self {
        if in_gate {
            Self::InGate
        } else if on {
            Self::Landed
        } else if off {
            Self::Airborne
        } else if out {
            Self::Pushback
        } else {
            Self::Scheduled
        }
    }

    pub fn is_on_ground(self) -> bool {
        !matches!(self, Self::Airborne)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Pushback => "PUSHBACK",
            Self::Airborne => "AIRBORNE",
            Self::Landed => "LANDED",
            Self::InGate => "IN_GATE",
        }
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which feed the next cycle should poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PollPriority {
    #[default]
    Leg,
    Fault,
}

impl fmt::Display for PollPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leg => f.write_str("LEG"),
            Self::Fault => f.write_str("FAULT"),
        }
    }
}

/// Observed progress of one leg.
///
/// Timestamp fields are only ever filled, never cleared. The phase is not
/// stored; it is recomputed from the timestamps on every read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegProgress {
    pub flight_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_airport: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_airport: Option<String>,

    #[serde(default)]
    pub out: Option<NaiveDateTime>,

    #[serde(default)]
    pub off: Option<NaiveDateTime>,

    #[serde(default)]
    pub on: Option<NaiveDateTime>,

    #[serde(default, rename = "in")]
    pub in_gate: Option<NaiveDateTime>,

    /// `off + duration`, fixed the first time OFF is seen
    #[serde(default)]
    pub scheduled_arrival: Option<NaiveDateTime>,

    #[serde(default)]
    pub last_update: Option<NaiveDateTime>,
}

impl LegProgress {
    pub fn new(flight_number: impl Into<String>) -> Self {
        Self {
            flight_number: flight_number.into(),
            ..Default::default()
        }
    }

    pub fn phase(&self) -> FlightPhase {
        FlightPhase::derive(
            self.out.is_some(),
            self.off.is_some(),
            self.on.is_some(),
            self.in_gate.is_some(),
        )
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == FlightPhase::InGate
    }

    /// Latest populated timestamp, used to anchor the next one.
    pub fn latest_stamp(&self) -> Option<NaiveDateTime> {
        [self.out, self.off, self.on, self.in_gate]
            .into_iter()
            .flatten()
            .max()
    }

    /// Record OFF's derived arrival. No-op once set.
    pub fn fix_scheduled_arrival(&mut self, duration_minutes: u32) {
        if self.scheduled_arrival.is_none() {
            if let Some(off) = self.off {
                self.scheduled_arrival = Some(off + Duration::minutes(i64::from(duration_minutes)));
            }
        }
    }
}

/// Per-aircraft view handed out by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlightLifecycleState {
    pub aircraft: String,
    pub current_flight: String,
    pub phase: FlightPhase,
    pub out: Option<NaiveDateTime>,
    pub off: Option<NaiveDateTime>,
    pub on: Option<NaiveDateTime>,
    pub in_gate: Option<NaiveDateTime>,
    pub scheduled_arrival: Option<NaiveDateTime>,
    pub last_update: Option<NaiveDateTime>,
}

impl FlightLifecycleState {
    pub fn from_leg(aircraft: &str, leg: &LegProgress) -> Self {
        Self {
            aircraft: aircraft.to_string(),
            current_flight: leg.flight_number.clone(),
            phase: leg.phase(),
            out: leg.out,
            off: leg.off,
            on: leg.on,
            in_gate: leg.in_gate,
            scheduled_arrival: leg.scheduled_arrival,
            last_update: leg.last_update,
        }
    }
}

// src/models/schedule.rs

//! Static flight schedule and route chains.
//!
//! Loaded once at startup (from `schedule.toml` or the built-in defaults)
//! and shared read-only by the tracker, anomaly detector and alert checker.
//! Scheduled times are in the feed's own time zone.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::time::parse_hhmm;

/// One scheduled leg.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlightLeg {
    pub flight_number: String,

    /// `HH:MM`
    pub scheduled_departure: String,

    pub duration_minutes: u32,

    /// Route label, e.g. `HAN-VCS`
    pub route: String,

    /// Full airport label as the feed reports it, e.g. `VVNB-内排国际机场`
    pub departure_airport: String,
    pub arrival_airport: String,
}

impl FlightLeg {
    pub fn departure_time(&self) -> Option<NaiveTime> {
        parse_hhmm(&self.scheduled_departure)
    }
}

/// Ordered flights one aircraft flies in a day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteChain {
    pub name: String,
    pub flights: Vec<String>,
}

impl RouteChain {
    pub fn position(&self, flight_number: &str) -> Option<usize> {
        self.flights.iter().position(|f| f == flight_number)
    }

    pub fn terminal(&self) -> Option<&str> {
        self.flights.last().map(String::as_str)
    }
}

/// Airport naming entry used for short labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Airport {
    /// IATA code, e.g. `HAN`
    pub code: String,

    /// Label as it appears in feed rows
    pub label: String,

    /// Display name, e.g. `河内`
    pub short_name: String,
}

impl Airport {
    /// ICAO prefix of the label (`VVNB` for `VVNB-内排国际机场`).
    pub fn icao(&self) -> Option<&str> {
        self.label.split_once('-').map(|(code, _)| code)
    }

    fn matches(&self, value: &str) -> bool {
        value == self.code || value == self.label || self.icao() == Some(value)
    }
}

/// The full static schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightSchedule {
    #[serde(default = "defaults::home_airport")]
    pub home_airport: String,

    #[serde(default = "defaults::airports")]
    pub airports: Vec<Airport>,

    #[serde(default = "defaults::flights")]
    pub flights: Vec<FlightLeg>,

    #[serde(default = "defaults::chains")]
    pub chains: Vec<RouteChain>,
}

impl Default for FlightSchedule {
    fn default() -> Self {
        Self {
            home_airport: defaults::home_airport(),
            airports: defaults::airports(),
            flights: defaults::flights(),
            chains: defaults::chains(),
        }
    }
}

impl FlightSchedule {
    /// Load a schedule from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load a schedule or fall back to the built-in one.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Schedule load failed from {:?}: {}. Using built-in schedule.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for leg in &self.flights {
            if !seen.insert(leg.flight_number.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate flight {}",
                    leg.flight_number
                )));
            }
            if leg.departure_time().is_none() {
                return Err(AppError::validation(format!(
                    "flight {} has unparseable departure '{}'",
                    leg.flight_number, leg.scheduled_departure
                )));
            }
            if leg.duration_minutes == 0 {
                return Err(AppError::validation(format!(
                    "flight {} has zero duration",
                    leg.flight_number
                )));
            }
        }

        let mut chained = HashSet::new();
        for chain in &self.chains {
            if chain.flights.is_empty() {
                return Err(AppError::validation(format!("chain {} is empty", chain.name)));
            }
            for flight in &chain.flights {
                if !seen.contains(flight.as_str()) {
                    return Err(AppError::validation(format!(
                        "chain {} references unknown flight {}",
                        chain.name, flight
                    )));
                }
                if !chained.insert(flight.as_str()) {
                    return Err(AppError::validation(format!(
                        "flight {} appears in more than one chain",
                        flight
                    )));
                }
            }
        }

        let home = self.canonical_airport(&self.home_airport);
        for chain in &self.chains {
            if let Some(last) = chain.terminal().and_then(|f| self.flight(f)) {
                if self.canonical_airport(&last.arrival_airport) != home {
                    log::warn!(
                        "chain {} ends at {} rather than the home airport {}",
                        chain.name,
                        last.arrival_airport,
                        self.home_airport
                    );
                }
            }
        }
        Ok(())
    }

    pub fn flight(&self, flight_number: &str) -> Option<&FlightLeg> {
        self.flights.iter().find(|f| f.flight_number == flight_number)
    }

    pub fn contains(&self, flight_number: &str) -> bool {
        self.flight(flight_number).is_some()
    }

    /// Like [`flight`](Self::flight) but as an error for callers that need one.
    pub fn require(&self, flight_number: &str) -> Result<&FlightLeg> {
        self.flight(flight_number)
            .ok_or_else(|| AppError::ScheduleLookupMiss(flight_number.to_string()))
    }

    pub fn chain_of(&self, flight_number: &str) -> Option<&RouteChain> {
        self.chains.iter().find(|c| c.position(flight_number).is_some())
    }

    /// True only for the terminal flight of its chain.
    pub fn is_last_in_chain(&self, flight_number: &str) -> bool {
        self.chain_of(flight_number)
            .and_then(RouteChain::terminal)
            .is_some_and(|last| last == flight_number)
    }

    /// The flight following `flight_number` in its chain.
    pub fn next_in_chain(&self, flight_number: &str) -> Option<&str> {
        let chain = self.chain_of(flight_number)?;
        let idx = chain.position(flight_number)?;
        chain.flights.get(idx + 1).map(String::as_str)
    }

    /// Look up an airport by IATA code, ICAO code or full label.
    pub fn airport(&self, value: &str) -> Option<&Airport> {
        let value = value.trim();
        self.airports.iter().find(|a| a.matches(value))
    }

    /// Resolve codes to the full label so that `HAN` and
    /// `VVNB-内排国际机场` compare equal. Unknown values pass through.
    pub fn canonical_airport(&self, value: &str) -> String {
        self.airport(value)
            .map(|a| a.label.clone())
            .unwrap_or_else(|| value.trim().to_string())
    }

    /// Planned route rendered with short names, e.g. `河内-昆岛`.
    pub fn route_display(&self, flight_number: &str) -> Option<String> {
        let leg = self.flight(flight_number)?;
        let (dep, arr) = leg.route.split_once('-')?;
        let name = |code: &str| {
            self.airport(code)
                .map(|a| a.short_name.clone())
                .unwrap_or_else(|| code.to_string())
        };
        Some(format!("{}-{}", name(dep), name(arr)))
    }
}

mod defaults {
    use super::{Airport, FlightLeg, RouteChain};

    pub fn home_airport() -> String {
        "HAN".into()
    }

    pub fn airports() -> Vec<Airport> {
        [
            ("HAN", "VVNB-内排国际机场", "河内"),
            ("VCS", "VVCS-昆仑国际机场", "昆岛"),
            ("SGN", "VVTS-新山一国际机场", "胡志明"),
        ]
        .into_iter()
        .map(|(code, label, short)| Airport {
            code: code.into(),
            label: label.into(),
            short_name: short.into(),
        })
        .collect()
    }

    fn leg(flight: &str, dep_time: &str, minutes: u32, route: &str) -> FlightLeg {
        fn label(code: &str) -> &str {
            match code {
                "HAN" => "VVNB-内排国际机场",
                "VCS" => "VVCS-昆仑国际机场",
                "SGN" => "VVTS-新山一国际机场",
                other => other,
            }
        }
        let (dep, arr) = route.split_once('-').unwrap_or((route, route));
        FlightLeg {
            flight_number: flight.into(),
            scheduled_departure: dep_time.into(),
            duration_minutes: minutes,
            route: route.into(),
            departure_airport: label(dep).into(),
            arrival_airport: label(arr).into(),
        }
    }

    pub fn flights() -> Vec<FlightLeg> {
        vec![
            leg("VJ105", "07:45", 110, "HAN-VCS"),
            leg("VJ107", "09:15", 110, "HAN-VCS"),
            leg("VJ112", "10:20", 30, "VCS-SGN"),
            leg("VJ113", "12:00", 30, "SGN-VCS"),
            leg("VJ118", "12:00", 30, "VCS-SGN"),
            leg("VJ106", "13:05", 110, "VCS-HAN"),
            leg("VJ119", "13:30", 30, "SGN-VCS"),
            leg("VJ108", "15:00", 110, "VCS-HAN"),
        ]
    }

    pub fn chains() -> Vec<RouteChain> {
        vec![
            RouteChain {
                name: "A".into(),
                flights: vec!["VJ105".into(), "VJ112".into(), "VJ113".into(), "VJ106".into()],
            },
            RouteChain {
                name: "B".into(),
                flights: vec!["VJ107".into(), "VJ118".into(), "VJ119".into(), "VJ108".into()],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_valid() {
        let schedule = FlightSchedule::default();
        assert!(schedule.validate().is_ok());
        assert_eq!(schedule.flights.len(), 8);
    }

    #[test]
    fn default_legs_carry_full_airport_labels() {
        let schedule = FlightSchedule::default();
        let leg = schedule.flight("VJ112").unwrap();
        assert_eq!(leg.departure_airport, "VVCS-昆仑国际机场");
        assert_eq!(leg.arrival_airport, "VVTS-新山一国际机场");
        assert_eq!(schedule.route_display("VJ112").as_deref(), Some("昆岛-胡志明"));
    }

    #[test]
    fn last_in_chain_only_for_terminal_flight() {
        let schedule = FlightSchedule::default();
        assert!(schedule.is_last_in_chain("VJ106"));
        assert!(schedule.is_last_in_chain("VJ108"));
        assert!(!schedule.is_last_in_chain("VJ105"));
        assert!(!schedule.is_last_in_chain("VJ113"));
        assert!(!schedule.is_last_in_chain("VJ999"));
    }

    #[test]
    fn next_in_chain_walks_forward() {
        let schedule = FlightSchedule::default();
        assert_eq!(schedule.next_in_chain("VJ107"), Some("VJ118"));
        assert_eq!(schedule.next_in_chain("VJ108"), None);
        assert_eq!(schedule.chain_of("VJ119").map(|c| c.name.as_str()), Some("B"));
    }

    #[test]
    fn airports_resolve_by_any_code() {
        let schedule = FlightSchedule::default();
        assert_eq!(schedule.canonical_airport("HAN"), "VVNB-内排国际机场");
        assert_eq!(schedule.canonical_airport("VVCS"), "VVCS-昆仑国际机场");
        assert_eq!(schedule.canonical_airport("VVCI-海防吉碑国际"), "VVCI-海防吉碑国际");
        assert_eq!(schedule.route_display("VJ112").as_deref(), Some("昆岛-胡志明"));
    }

    #[test]
    fn validate_rejects_unknown_chain_member() {
        let mut schedule = FlightSchedule::default();
        schedule.chains[0].flights.push("VJ999".into());
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let schedule: FlightSchedule = toml::from_str(
            r#"
            home_airport = "HAN"

            [[chains]]
            name = "A"
            flights = ["VJ105", "VJ106"]
            "#,
        )
        .unwrap();
        assert_eq!(schedule.chains.len(), 1);
        assert_eq!(schedule.flights.len(), 8);
        assert!(schedule.is_last_in_chain("VJ106"));
        assert!(schedule.validate().is_ok());
    }

    #[test]
    fn require_reports_lookup_miss() {
        let schedule = FlightSchedule::default();
        assert!(matches!(
            schedule.require("VJ999"),
            Err(AppError::ScheduleLookupMiss(_))
        ));
    }
}

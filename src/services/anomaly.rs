// src/services/anomaly.rs

//! Diversion detection.
//!
//! Compares an observed leg (flight number plus the airports the feed
//! reports) against the static schedule. Pure: no I/O, no state.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::models::{Anomaly, AnomalyKind, FlightSchedule, LegRow};

/// `VVCI-海防吉碑国际` → code `VVCI`, name `海防吉碑国际`.
static AIRPORT_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<code>[A-Z0-9]{3,4})-(?P<name>.+)$").ok());

/// Suffixes stripped from airport names, longest first.
const SUFFIXES: [&str; 3] = ["国际机场", "机场", "国际"];

/// Original route recorded for flights absent from the schedule.
pub const UNKNOWN_ROUTE: &str = "未知";

/// Short display name derived from an airport label.
///
/// Only the first matching suffix is removed. Labels without a code prefix,
/// or whose name would be empty after stripping, are returned unchanged.
pub fn airport_short(label: &str) -> String {
    let label = label.trim();
    let Some(caps) = AIRPORT_LABEL.as_ref().and_then(|re| re.captures(label)) else {
        return label.to_string();
    };
    let name = &caps["name"];
    let stripped = SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name);
    if stripped.is_empty() {
        label.to_string()
    } else {
        stripped.to_string()
    }
}

/// Detects unplanned legs against a static schedule.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    schedule: Arc<FlightSchedule>,
}

impl AnomalyDetector {
    pub fn new(schedule: Arc<FlightSchedule>) -> Self {
        Self { schedule }
    }

    /// Short name, preferring the schedule's airport table.
    pub fn short_name(&self, airport: &str) -> String {
        match self.schedule.airport(airport) {
            Some(known) => known.short_name.clone(),
            None => airport_short(airport),
        }
    }

    /// Short name, or `未知` for a blank airport.
    fn short_or_unknown(&self, airport: &str) -> String {
        if airport.is_empty() {
            UNKNOWN_ROUTE.to_string()
        } else {
            self.short_name(airport)
        }
    }

    /// Classify one observed leg. Unknown flights are always flagged; for
    /// scheduled flights `None` means it matches the plan or the airports
    /// are not known yet.
    pub fn detect(
        &self,
        flight_number: &str,
        departure_airport: &str,
        arrival_airport: &str,
    ) -> Option<Anomaly> {
        let (dep, arr) = (departure_airport.trim(), arrival_airport.trim());

        let Some(planned) = self.schedule.flight(flight_number) else {
            let arr_short = self.short_or_unknown(arr);
            return Some(Anomaly {
                kind: AnomalyKind::UnknownFlight,
                original_route: UNKNOWN_ROUTE.to_string(),
                actual_route: format!("{}-{}", self.short_or_unknown(dep), arr_short),
                anomaly_airport: arr_short,
            });
        };

        if dep.is_empty() || arr.is_empty() {
            return None;
        }

        let dep_short = self.short_name(dep);
        let arr_short = self.short_name(arr);

        let dep_label = self.schedule.canonical_airport(dep);
        let arr_label = self.schedule.canonical_airport(arr);

        if dep_label == arr_label {
            return Some(Anomaly {
                kind: AnomalyKind::SameAirport,
                original_route: planned.route.clone(),
                actual_route: format!("{}-{}", dep_short, dep_short),
                anomaly_airport: dep_short,
            });
        }

        let planned_pair = (
            self.schedule.canonical_airport(&planned.departure_airport),
            self.schedule.canonical_airport(&planned.arrival_airport),
        );
        if (dep_label, arr_label) != planned_pair {
            return Some(Anomaly {
                kind: AnomalyKind::RouteMismatch,
                original_route: planned.route.clone(),
                actual_route: format!("{}-{}", dep_short, arr_short),
                anomaly_airport: arr_short,
            });
        }

        None
    }

    /// Detect from a feed row; rows without both airports are skipped.
    pub fn detect_row(&self, row: &LegRow) -> Option<Anomaly> {
        self.detect(&row.flight_number, row.departure()?, row.arrival()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(Arc::new(FlightSchedule::default()))
    }

    #[test]
    fn planned_leg_is_not_anomalous() {
        let d = detector();
        assert_eq!(d.detect("VJ105", "HAN", "VCS"), None);
        assert_eq!(
            d.detect("VJ105", "VVNB-内排国际机场", "VVCS-昆仑国际机场"),
            None
        );
    }

    #[test]
    fn same_airport_is_flagged() {
        let anomaly = detector().detect("VJ105", "HAN", "HAN").unwrap();
        assert_eq!(anomaly.kind, AnomalyKind::SameAirport);
        assert_eq!(anomaly.original_route, "HAN-VCS");
        assert_eq!(anomaly.actual_route, "河内-河内");
        assert_eq!(anomaly.anomaly_airport, "河内");
    }

    #[test]
    fn unknown_flight_is_flagged() {
        let anomaly = detector()
            .detect("VJ999", "VVNB-内排国际机场", "VVCI-海防吉碑国际")
            .unwrap();
        assert_eq!(anomaly.kind, AnomalyKind::UnknownFlight);
        assert_eq!(anomaly.original_route, UNKNOWN_ROUTE);
        assert_eq!(anomaly.actual_route, "河内-海防吉碑");
        assert_eq!(anomaly.anomaly_airport, "海防吉碑");
    }

    #[test]
    fn unknown_flight_is_flagged_without_airports() {
        let anomaly = detector().detect("VJ999", "", "").unwrap();
        assert_eq!(anomaly.kind, AnomalyKind::UnknownFlight);
        assert_eq!(anomaly.original_route, UNKNOWN_ROUTE);
        assert_eq!(anomaly.actual_route, "未知-未知");
        assert_eq!(anomaly.anomaly_airport, "未知");

        let anomaly = detector().detect("VJ999", "VVNB-内排国际机场", "").unwrap();
        assert_eq!(anomaly.actual_route, "河内-未知");
    }

    #[test]
    fn diversion_is_route_mismatch() {
        let anomaly = detector()
            .detect("VJ107", "VVNB-内排国际机场", "VVTS-新山一国际机场")
            .unwrap();
        assert_eq!(anomaly.kind, AnomalyKind::RouteMismatch);
        assert_eq!(anomaly.original_route, "HAN-VCS");
        assert_eq!(anomaly.actual_route, "河内-胡志明");
        assert_eq!(anomaly.anomaly_airport, "胡志明");
    }

    #[test]
    fn missing_airports_yield_nothing_for_scheduled_flights() {
        let d = detector();
        assert_eq!(d.detect("VJ105", "", "VCS"), None);
        assert_eq!(d.detect("VJ105", "HAN", "  "), None);
        let row = LegRow {
            aircraft: "B-652G".into(),
            flight_number: "VJ105".into(),
            departure_airport: Some("VVNB-内排国际机场".into()),
            ..Default::default()
        };
        assert_eq!(d.detect_row(&row), None);
    }

    #[test]
    fn short_names_strip_one_suffix() {
        assert_eq!(airport_short("VVCI-海防吉碑国际"), "海防吉碑");
        assert_eq!(airport_short("VVDN-岘港国际机场"), "岘港");
        assert_eq!(airport_short("VVPQ-富国机场"), "富国");
        assert_eq!(airport_short("VVXX-国际机场"), "VVXX-国际机场");
        assert_eq!(airport_short("Unlabelled"), "Unlabelled");
        assert_eq!(detector().short_name("VVTS-新山一国际机场"), "胡志明");
    }
}

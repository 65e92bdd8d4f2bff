// src/pipeline/leg_status.rs

//! Leg status lines, one per aircraft.
//!
//! Feed times are shifted by the display offset before rendering. Routes
//! use the airports the feed reported when both are known, and the planned
//! route otherwise.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::models::{DisplayConfig, FlightPhase, FlightSchedule, LegProgress};
use crate::pipeline::notifier::StatusMonitor;
use crate::services::{AircraftStatus, AnomalyDetector, FlightLifecycleTracker};
use crate::utils::time::{format_hhmm, shift_minutes};

const UNKNOWN: &str = "未知";

/// Tracker view the leg monitor renders.
#[derive(Debug, Clone)]
pub struct LegStatusData {
    pub date: NaiveDate,
    pub aircraft: Vec<AircraftStatus>,
}

impl LegStatusData {
    pub fn from_tracker(tracker: &FlightLifecycleTracker) -> Self {
        Self {
            date: tracker.date(),
            aircraft: tracker.fleet_status(),
        }
    }
}

pub struct LegStatusMonitor {
    schedule: Arc<FlightSchedule>,
    detector: AnomalyDetector,
    display: DisplayConfig,
}

impl LegStatusMonitor {
    pub fn new(schedule: Arc<FlightSchedule>, display: DisplayConfig) -> Self {
        Self {
            detector: AnomalyDetector::new(Arc::clone(&schedule)),
            schedule,
            display,
        }
    }

    fn airport(&self, label: Option<&str>) -> String {
        match label {
            Some(label) if !label.trim().is_empty() => self.detector.short_name(label),
            _ => UNKNOWN.to_string(),
        }
    }

    /// Arrival airport of a leg, falling back to the planned one.
    fn arrival(&self, leg: &LegProgress) -> String {
        let planned = self
            .schedule
            .flight(&leg.flight_number)
            .map(|f| f.arrival_airport.as_str());
        self.airport(leg.arrival_airport.as_deref().or(planned))
    }

    fn departure(&self, leg: &LegProgress) -> String {
        let planned = self
            .schedule
            .flight(&leg.flight_number)
            .map(|f| f.departure_airport.as_str());
        self.airport(leg.departure_airport.as_deref().or(planned))
    }

    fn route(&self, leg: &LegProgress) -> String {
        match (leg.departure_airport.as_deref(), leg.arrival_airport.as_deref()) {
            (Some(dep), Some(arr)) => format!(
                "{}-{}",
                self.detector.short_name(dep),
                self.detector.short_name(arr)
            ),
            _ => self
                .schedule
                .route_display(&leg.flight_number)
                .unwrap_or_default(),
        }
    }

    fn local_time(&self, stamp: Option<NaiveDateTime>) -> String {
        match stamp {
            Some(stamp) => format!(
                "{}{}",
                self.display.zone_label,
                format_hhmm(shift_minutes(stamp.time(), self.display.offset_minutes))
            ),
            None => format!("{}{}", self.display.zone_label, UNKNOWN),
        }
    }

    fn parked(&self, status: &AircraftStatus, leg: &LegProgress) -> String {
        let airport = self.arrival(leg);
        if status.finished {
            return format!("{}停靠{}；已完成今日所有航班。", status.aircraft, airport);
        }
        match status.next_flight.as_deref() {
            Some(next) => format!("{}停靠{}；计划执行{}。", status.aircraft, airport, next),
            None => format!("{}停靠{}。", status.aircraft, airport),
        }
    }

    /// Status line for one aircraft, without the anomaly warning.
    pub fn status_line(&self, status: &AircraftStatus) -> String {
        let leg = &status.current;
        let a = &status.aircraft;
        let f = &leg.flight_number;

        match leg.phase() {
            FlightPhase::InGate => self.parked(status, leg),
            FlightPhase::Landed => format!(
                "{}执行{}（{}），已于{}在{}落地。",
                a,
                f,
                self.route(leg),
                self.local_time(leg.on),
                self.arrival(leg)
            ),
            FlightPhase::Airborne => format!(
                "{}执行{}（{}），已于{}从{}起飞。",
                a,
                f,
                self.route(leg),
                self.local_time(leg.off),
                self.departure(leg)
            ),
            FlightPhase::Pushback => format!(
                "{}执行{}（{}），已于{}滑出。",
                a,
                f,
                self.route(leg),
                self.local_time(leg.out)
            ),
            FlightPhase::Scheduled => match &status.last_completed {
                Some(done) => self.parked(status, done),
                None => format!("{}计划执行{}（{}）。", a, f, self.route(leg)),
            },
        }
    }

    pub fn lines_for(&self, status: &AircraftStatus) -> Vec<String> {
        let mut lines = vec![self.status_line(status)];
        if let Some(record) = status.anomalies.last() {
            lines.push(record.warning());
        }
        lines
    }
}

impl StatusMonitor for LegStatusMonitor {
    type Data = LegStatusData;

    fn kind(&self) -> &str {
        "leg"
    }

    fn subject(&self, data: &LegStatusData) -> String {
        format!("航班状态 - {}", data.date)
    }

    fn generate_content(&self, data: &LegStatusData) -> Vec<String> {
        data.aircraft.iter().flat_map(|s| self.lines_for(s)).collect()
    }

    fn metadata(&self, data: &LegStatusData, content: &[String]) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("target_date".into(), Value::from(data.date.to_string()));
        metadata.insert("aircraft_count".into(), Value::from(data.aircraft.len()));
        metadata.insert("line_count".into(), Value::from(content.len()));
        metadata
    }
}

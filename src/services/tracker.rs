// src/services/tracker.rs

//! Per-aircraft flight lifecycle tracking.
//!
//! The tracker folds leg rows into per-leg timestamps, works out which leg
//! of its route chain each aircraft is on, and decides which feed the next
//! cycle should poll.
//!
//! ## Poll priority
//!
//! First match wins:
//!
//! 1. an airborne aircraft is at or past its scheduled arrival → LEG
//! 2. a grounded aircraft is at or past its next scheduled departure → LEG
//! 3. every tracked aircraft is airborne → FAULT
//! 4. otherwise → LEG

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::models::{
    AnomalyRecord, FlightLifecycleState, FlightPhase, FlightSchedule, LegKey, LegProgress,
    LegRow, PollPriority, TrackerSnapshot,
};
use crate::services::AnomalyDetector;
use crate::utils::time::{anchor, format_hhmm};

/// Outcome of folding one batch of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Rows that belonged to a tracked aircraft
    pub applied: usize,
    /// Rows for aircraft outside the fleet
    pub ignored: usize,
    /// Timestamp cells that were present but unparseable
    pub malformed: usize,
    /// Rows that set at least one new timestamp
    pub changed: usize,
}

/// Priority plus the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollDecision {
    pub priority: PollPriority,
    pub reason: String,
}

impl PollDecision {
    fn new(priority: PollPriority, reason: impl Into<String>) -> Self {
        Self {
            priority,
            reason: reason.into(),
        }
    }
}

/// Derived per-aircraft view used by status rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AircraftStatus {
    pub aircraft: String,

    /// Flights in flying order (route chain, or observed order when unknown)
    pub sequence: Vec<String>,

    /// First leg not yet at the gate, or the last completed one
    pub current: LegProgress,

    pub last_completed: Option<LegProgress>,

    /// Flight after `last_completed` in the sequence
    pub next_flight: Option<String>,

    /// Completed the terminal flight of its chain
    pub finished: bool,

    pub anomalies: Vec<AnomalyRecord>,
}

impl AircraftStatus {
    pub fn phase(&self) -> FlightPhase {
        self.current.phase()
    }
}

#[derive(Debug, Clone, Default)]
struct AircraftTrack {
    /// Legs in the order they were first observed
    legs: Vec<LegProgress>,
}

impl AircraftTrack {
    fn leg(&self, flight_number: &str) -> Option<&LegProgress> {
        self.legs.iter().find(|l| l.flight_number == flight_number)
    }

    fn leg_mut(&mut self, flight_number: &str) -> &mut LegProgress {
        let idx = match self.legs.iter().position(|l| l.flight_number == flight_number) {
            Some(idx) => idx,
            None => {
                self.legs.push(LegProgress::new(flight_number));
                self.legs.len() - 1
            }
        };
        &mut self.legs[idx]
    }

    fn latest_stamp(&self) -> Option<NaiveDateTime> {
        self.legs.iter().filter_map(LegProgress::latest_stamp).max()
    }
}

/// Phase state machine for a fixed fleet.
#[derive(Debug, Clone)]
pub struct FlightLifecycleTracker {
    schedule: Arc<FlightSchedule>,
    detector: AnomalyDetector,
    fleet: Vec<String>,
    date: NaiveDate,
    tracks: BTreeMap<String, AircraftTrack>,
    anomalies: BTreeMap<(String, String), AnomalyRecord>,
}

impl FlightLifecycleTracker {
    pub fn new(schedule: Arc<FlightSchedule>, fleet: Vec<String>, date: NaiveDate) -> Self {
        Self {
            detector: AnomalyDetector::new(Arc::clone(&schedule)),
            schedule,
            fleet,
            date,
            tracks: BTreeMap::new(),
            anomalies: BTreeMap::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn schedule(&self) -> &FlightSchedule {
        &self.schedule
    }

    pub fn fleet(&self) -> &[String] {
        &self.fleet
    }

    /// Start a fresh day. No-op when `date` is the current one.
    pub fn roll_over(&mut self, date: NaiveDate) {
        if date != self.date {
            log::info!("Tracker rolling over from {} to {}", self.date, date);
            self.date = date;
            self.tracks.clear();
            self.anomalies.clear();
        }
    }

    /// Fold a batch of leg rows into the tracked state.
    ///
    /// Timestamps are only ever set or overwritten by a parseable value;
    /// blank or malformed cells leave the previous value in place.
    pub fn update(&mut self, rows: &[LegRow], now: NaiveDateTime) -> UpdateReport {
        let mut report = UpdateReport::default();

        for row in rows {
            if !self.fleet.iter().any(|a| a == &row.aircraft) {
                log::debug!("Ignoring row for untracked aircraft {}", row.aircraft);
                report.ignored += 1;
                continue;
            }
            if row.flight_number.trim().is_empty() {
                log::warn!("Ignoring {} row without a flight number", row.aircraft);
                report.ignored += 1;
                continue;
            }
            report.applied += 1;

            for column in row.malformed_columns() {
                log::warn!(
                    "{} {}: unparseable {} value, keeping previous",
                    row.aircraft,
                    row.flight_number,
                    column
                );
                report.malformed += 1;
            }

            if self.apply_row(row, now) {
                report.changed += 1;
            }
            self.record_anomaly(row);
        }

        if report.changed > 0 {
            for line in self.summary() {
                log::info!("{}", line);
            }
        }
        report
    }

    fn apply_row(&mut self, row: &LegRow, now: NaiveDateTime) -> bool {
        let date = self.date;
        let duration = self
            .schedule
            .flight(&row.flight_number)
            .map(|f| f.duration_minutes);

        let track = self.tracks.entry(row.aircraft.clone()).or_default();
        let floor = track.latest_stamp();
        let leg = track.leg_mut(&row.flight_number);

        if let Some(dep) = row.departure() {
            leg.departure_airport = Some(dep.to_string());
        }
        if let Some(arr) = row.arrival() {
            leg.arrival_airport = Some(arr.to_string());
        }

        let mut changed = false;
        let mut previous = leg.out.or(floor);
        let mut set = |slot: &mut Option<NaiveDateTime>, value: Option<NaiveTime>| {
            if let Some(time) = value {
                let stamp = anchor(date, time, previous);
                if *slot != Some(stamp) {
                    *slot = Some(stamp);
                    changed = true;
                }
            }
            if slot.is_some() {
                previous = *slot;
            }
        };
        set(&mut leg.out, row.out_time());
        set(&mut leg.off, row.off_time());
        set(&mut leg.on, row.on_time());
        set(&mut leg.in_gate, row.in_time());

        match duration {
            Some(minutes) => leg.fix_scheduled_arrival(minutes),
            None if leg.off.is_some() && leg.scheduled_arrival.is_none() => {
                log::debug!(
                    "{} not in schedule; no scheduled arrival for {}",
                    row.flight_number,
                    row.aircraft
                );
            }
            None => {}
        }

        if changed {
            leg.last_update = Some(now);
        }
        changed
    }

    fn record_anomaly(&mut self, row: &LegRow) {
        let key = (row.aircraft.clone(), row.flight_number.clone());
        match self.detector.detect_row(row) {
            Some(anomaly) => {
                let record = AnomalyRecord {
                    leg: LegKey {
                        aircraft: row.aircraft.clone(),
                        flight_number: row.flight_number.clone(),
                        date: self.date,
                    },
                    anomaly,
                };
                if self.anomalies.get(&key) != Some(&record) {
                    log::warn!("{}", record.event_line());
                }
                self.anomalies.insert(key, record);
            }
            None => {
                if row.departure().is_some() && row.arrival().is_some() {
                    self.anomalies.remove(&key);
                }
            }
        }
    }

    /// Flights in flying order for one aircraft.
    fn sequence(&self, track: &AircraftTrack) -> Vec<String> {
        let chain = track
            .legs
            .first()
            .and_then(|first| self.schedule.chain_of(&first.flight_number));

        let mut sequence: Vec<String> = chain.map(|c| c.flights.clone()).unwrap_or_default();
        let known: HashSet<String> = sequence.iter().cloned().collect();

        // Observed flights outside the chain, by scheduled departure or OUT
        let mut extra: Vec<(NaiveTime, String)> = track
            .legs
            .iter()
            .filter(|l| !known.contains(&l.flight_number))
            .map(|l| {
                let key = self
                    .schedule
                    .flight(&l.flight_number)
                    .and_then(|f| f.departure_time())
                    .or_else(|| l.out.map(|o| o.time()))
                    .unwrap_or(NaiveTime::MIN);
                (key, l.flight_number.clone())
            })
            .collect();
        extra.sort();
        sequence.extend(extra.into_iter().map(|(_, f)| f));
        sequence
    }

    fn status_of(&self, aircraft: &str, track: &AircraftTrack) -> AircraftStatus {
        let sequence = self.sequence(track);

        // Unobserved flights before the last observed one are data gaps,
        // not pending legs.
        let last_observed = sequence
            .iter()
            .rposition(|f| track.leg(f).is_some())
            .unwrap_or(0);

        let mut current = None;
        let mut last_completed: Option<LegProgress> = None;
        for (idx, flight) in sequence.iter().enumerate() {
            match track.leg(flight) {
                Some(leg) if leg.is_completed() => last_completed = Some(leg.clone()),
                Some(leg) => {
                    current = Some(leg.clone());
                    break;
                }
                None if idx < last_observed => continue,
                None => {
                    current = Some(LegProgress::new(flight.clone()));
                    break;
                }
            }
        }

        let next_flight = last_completed.as_ref().and_then(|done| {
            let idx = sequence.iter().position(|f| f == &done.flight_number)?;
            sequence.get(idx + 1).cloned()
        });
        let finished = current.is_none()
            && last_completed
                .as_ref()
                .is_some_and(|done| self.schedule.is_last_in_chain(&done.flight_number));

        let current = current
            .or_else(|| last_completed.clone())
            .unwrap_or_default();

        let anomalies = sequence
            .iter()
            .filter_map(|f| self.anomalies.get(&(aircraft.to_string(), f.clone())))
            .cloned()
            .collect();

        AircraftStatus {
            aircraft: aircraft.to_string(),
            sequence,
            current,
            last_completed,
            next_flight,
            finished,
            anomalies,
        }
    }

    /// Derived status of every aircraft that has reported at least once,
    /// in fleet order.
    pub fn fleet_status(&self) -> Vec<AircraftStatus> {
        self.fleet
            .iter()
            .filter_map(|a| self.tracks.get(a).map(|t| self.status_of(a, t)))
            .collect()
    }

    pub fn aircraft_status(&self, aircraft: &str) -> Option<AircraftStatus> {
        self.tracks.get(aircraft).map(|t| self.status_of(aircraft, t))
    }

    /// Lifecycle view of one aircraft's current leg.
    pub fn state(&self, aircraft: &str) -> Option<FlightLifecycleState> {
        self.aircraft_status(aircraft)
            .map(|s| FlightLifecycleState::from_leg(aircraft, &s.current))
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.anomalies.values()
    }

    /// True only for the terminal flight of a route chain.
    pub fn is_last_in_chain(&self, flight_number: &str) -> bool {
        self.schedule.is_last_in_chain(flight_number)
    }

    /// Scheduled departure of `flight` on the tracked date.
    fn departure_of(&self, flight: &str) -> Option<NaiveDateTime> {
        let time = self.schedule.flight(flight)?.departure_time()?;
        Some(self.date.and_time(time))
    }

    /// Decide which feed to poll, with the deciding rule.
    pub fn poll_decision(&self, now: NaiveDateTime) -> PollDecision {
        let statuses = self.fleet_status();
        if statuses.is_empty() {
            return PollDecision::new(PollPriority::Leg, "no aircraft has reported yet");
        }

        for status in &statuses {
            if status.phase() != FlightPhase::Airborne {
                continue;
            }
            match status.current.scheduled_arrival {
                Some(eta) if now >= eta => {
                    return PollDecision::new(
                        PollPriority::Leg,
                        format!(
                            "{} {} overdue, scheduled arrival {}",
                            status.aircraft,
                            status.current.flight_number,
                            format_hhmm(eta.time())
                        ),
                    );
                }
                Some(_) => {}
                None => {
                    return PollDecision::new(
                        PollPriority::Leg,
                        format!(
                            "{} {} airborne with no scheduled arrival",
                            status.aircraft, status.current.flight_number
                        ),
                    );
                }
            }
        }

        for status in &statuses {
            if !status.phase().is_on_ground() || status.finished {
                continue;
            }
            let pending = if status.current.is_completed() {
                status.next_flight.as_deref()
            } else {
                Some(status.current.flight_number.as_str())
            };
            let Some(flight) = pending else {
                return PollDecision::new(
                    PollPriority::Leg,
                    format!("{} has no known next flight", status.aircraft),
                );
            };
            match self.departure_of(flight) {
                Some(departure) if now < departure => {}
                Some(_) => {
                    return PollDecision::new(
                        PollPriority::Leg,
                        format!("{} {} due for departure", status.aircraft, flight),
                    );
                }
                None => {
                    return PollDecision::new(
                        PollPriority::Leg,
                        format!("{} {} not in schedule, treating as due", status.aircraft, flight),
                    );
                }
            }
        }

        if statuses.iter().all(|s| s.phase() == FlightPhase::Airborne) {
            return PollDecision::new(PollPriority::Fault, "all aircraft airborne");
        }

        PollDecision::new(PollPriority::Leg, "default")
    }

    /// Which feed to poll next. Pure in (tracked state, `now`).
    pub fn decide_poll_priority(&self, now: NaiveDateTime) -> PollPriority {
        self.poll_decision(now).priority
    }

    /// One line per aircraft for the log.
    pub fn summary(&self) -> Vec<String> {
        self.fleet_status()
            .iter()
            .map(|s| {
                let mut line = format!(
                    "{} {} {}",
                    s.aircraft,
                    s.current.flight_number,
                    s.phase()
                );
                if s.phase() == FlightPhase::Airborne {
                    if let Some(eta) = s.current.scheduled_arrival {
                        line.push_str(&format!(" (ETA {})", format_hhmm(eta.time())));
                    }
                }
                if s.finished {
                    line.push_str(" [done for the day]");
                }
                line
            })
            .collect()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            date: Some(self.date),
            aircraft: self
                .tracks
                .iter()
                .map(|(a, t)| (a.clone(), t.legs.clone()))
                .collect(),
            anomalies: self.anomalies.values().cloned().collect(),
        }
    }

    /// Restore a snapshot taken earlier the same day. Snapshots for another
    /// date are ignored.
    pub fn restore(&mut self, snapshot: TrackerSnapshot) -> bool {
        if snapshot.date != Some(self.date) {
            log::info!(
                "Discarding tracker snapshot for {:?} (tracking {})",
                snapshot.date,
                self.date
            );
            return false;
        }
        self.tracks = snapshot
            .aircraft
            .into_iter()
            .filter(|(a, _)| self.fleet.contains(a))
            .map(|(a, legs)| (a, AircraftTrack { legs }))
            .collect();
        self.anomalies = snapshot
            .anomalies
            .into_iter()
            .map(|r| ((r.leg.aircraft.clone(), r.leg.flight_number.clone()), r))
            .collect();
        log::info!("Restored tracker state for {} aircraft", self.tracks.len());
        true
    }
}

// src/services/alerts.rs

//! Stalled-leg alerts.
//!
//! A leg stalls when a timestamp has been set for too long without the next
//! one following: pushed back but not airborne, airborne well past the
//! planned block time, or landed but not at the gate. Times are minutes of
//! the day and wrap across midnight.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};

use crate::models::{AlertConfig, AlertHistory, FlightSchedule, LegRow};
use crate::utils::time::minutes_since;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StallKind {
    OutWithoutOff,
    OffWithoutOn,
    OnWithoutIn,
}

impl fmt::Display for StallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OutWithoutOff => "OUT_WITHOUT_OFF",
            Self::OffWithoutOn => "OFF_WITHOUT_ON",
            Self::OnWithoutIn => "ON_WITHOUT_IN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegAlert {
    pub aircraft: String,
    pub flight_number: String,
    pub kind: StallKind,
    pub message: String,
}

impl LegAlert {
    /// Stable identity used for resend suppression.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.aircraft, self.flight_number, self.kind)
    }
}

/// Evaluates stall thresholds and resend suppression.
#[derive(Debug, Clone)]
pub struct LegAlertChecker {
    schedule: Arc<FlightSchedule>,
    config: AlertConfig,
}

impl LegAlertChecker {
    pub fn new(schedule: Arc<FlightSchedule>, config: AlertConfig) -> Self {
        Self { schedule, config }
    }

    fn alert(&self, row: &LegRow, kind: StallKind) -> LegAlert {
        let message = match kind {
            StallKind::OutWithoutOff => format!(
                "{} ({}) 滑出{}分钟仍未起飞。请确认飞机状态。",
                row.aircraft, row.flight_number, self.config.out_off_minutes
            ),
            StallKind::OffWithoutOn => format!(
                "{} ({}) 起飞超过计划航程时间仍未落地。请确认飞机状态。",
                row.aircraft, row.flight_number
            ),
            StallKind::OnWithoutIn => format!(
                "{} ({}) 落地{}分钟仍未停靠。请确认飞机状态。",
                row.aircraft, row.flight_number, self.config.on_in_minutes
            ),
        };
        LegAlert {
            aircraft: row.aircraft.clone(),
            flight_number: row.flight_number.clone(),
            kind,
            message,
        }
    }

    /// Stall alerts for a single row at wall-clock `now`.
    pub fn check_row(&self, row: &LegRow, now: NaiveTime) -> Vec<LegAlert> {
        let mut alerts = Vec::new();

        if let (Some(out), None) = (row.out_time(), row.off_time()) {
            if minutes_since(now, out) >= self.config.out_off_minutes {
                alerts.push(self.alert(row, StallKind::OutWithoutOff));
            }
        }

        if let (Some(off), None) = (row.off_time(), row.on_time()) {
            // Unknown flights have no block time to compare against
            if let Some(leg) = self.schedule.flight(&row.flight_number) {
                let threshold = i64::from(leg.duration_minutes) + self.config.off_on_grace_minutes;
                if minutes_since(now, off) >= threshold {
                    alerts.push(self.alert(row, StallKind::OffWithoutOn));
                }
            }
        }

        if let (Some(on), None) = (row.on_time(), row.in_time()) {
            if minutes_since(now, on) >= self.config.on_in_minutes {
                alerts.push(self.alert(row, StallKind::OnWithoutIn));
            }
        }

        alerts
    }

    pub fn check(&self, rows: &[LegRow], now: NaiveTime) -> Vec<LegAlert> {
        rows.iter().flat_map(|row| self.check_row(row, now)).collect()
    }

    /// Alerts never sent, or last sent at least the resend interval ago.
    pub fn due<'a>(
        &self,
        alerts: &'a [LegAlert],
        history: &AlertHistory,
        now: NaiveDateTime,
    ) -> Vec<&'a LegAlert> {
        alerts
            .iter()
            .filter(|alert| match history.alerts.get(&alert.key()) {
                None => true,
                Some(last) => (now - *last).num_seconds() >= self.config.resend_interval_secs,
            })
            .collect()
    }

    /// History after a cycle: keys that are no longer active are dropped,
    /// keys sent now get `now`, the rest keep their last send time.
    pub fn next_history(
        &self,
        active: &[LegAlert],
        previous: &AlertHistory,
        sent: &[&LegAlert],
        now: NaiveDateTime,
    ) -> AlertHistory {
        let sent: Vec<String> = sent.iter().map(|a| a.key()).collect();
        let alerts: BTreeMap<String, NaiveDateTime> = active
            .iter()
            .filter_map(|alert| {
                let key = alert.key();
                let stamp = if sent.contains(&key) {
                    Some(now)
                } else {
                    previous.alerts.get(&key).copied()
                };
                stamp.map(|s| (key, s))
            })
            .collect();
        AlertHistory {
            date: Some(now.date()),
            timestamp: Some(now),
            alerts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn checker() -> LegAlertChecker {
        LegAlertChecker::new(Arc::new(FlightSchedule::default()), AlertConfig::default())
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_time(t(h, m))
    }

    fn row(flight: &str, times: [&str; 4]) -> LegRow {
        let cell = |v: &str| (!v.is_empty()).then(|| v.to_string());
        LegRow {
            aircraft: "B-652G".into(),
            flight_number: flight.into(),
            out: cell(times[0]),
            off: cell(times[1]),
            on: cell(times[2]),
            in_gate: cell(times[3]),
            ..Default::default()
        }
    }

    #[test]
    fn out_without_off_fires_at_threshold() {
        let c = checker();
        let r = row("VJ105", ["07:50", "", "", ""]);
        assert!(c.check_row(&r, t(8, 19)).is_empty());
        let alerts = c.check_row(&r, t(8, 20));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].key(), "B-652G_VJ105_OUT_WITHOUT_OFF");
        assert!(alerts[0].message.contains("滑出30分钟"));
    }

    #[test]
    fn off_without_on_uses_block_time() {
        let c = checker();
        // VJ105 is 110 minutes; threshold 140 after 08:00 is 10:20
        let r = row("VJ105", ["07:50", "08:00", "", ""]);
        assert!(c.check_row(&r, t(10, 19)).is_empty());
        assert_eq!(c.check_row(&r, t(10, 20))[0].kind, StallKind::OffWithoutOn);

        let unknown = row("VJ999", ["07:50", "08:00", "", ""]);
        assert!(c.check_row(&unknown, t(23, 0)).is_empty());
    }

    #[test]
    fn on_without_in_wraps_midnight() {
        let c = checker();
        let r = row("VJ108", ["23:00", "23:10", "23:50", ""]);
        assert!(c.check_row(&r, t(0, 10)).is_empty());
        assert_eq!(c.check_row(&r, t(0, 20))[0].kind, StallKind::OnWithoutIn);
    }

    #[test]
    fn completed_leg_never_alerts() {
        let r = row("VJ105", ["07:50", "08:00", "09:45", "09:55"]);
        assert!(checker().check_row(&r, t(23, 0)).is_empty());
    }

    #[test]
    fn resend_interval_suppresses_repeats() {
        let c = checker();
        let alerts = c.check(&[row("VJ105", ["07:50", "", "", ""])], t(8, 30));
        let empty = AlertHistory::default();
        let due = c.due(&alerts, &empty, at(8, 30));
        assert_eq!(due.len(), 1);

        let history = c.next_history(&alerts, &empty, &due, at(8, 30));
        assert!(c.due(&alerts, &history, at(8, 34)).is_empty());
        assert_eq!(c.due(&alerts, &history, at(8, 35)).len(), 1);

        // Not re-sent: the stamp is kept, not refreshed
        let kept = c.next_history(&alerts, &history, &[], at(8, 34));
        assert_eq!(kept.alerts.get(&alerts[0].key()), Some(&at(8, 30)));
    }

    #[test]
    fn resolved_alerts_leave_history() {
        let c = checker();
        let alerts = c.check(&[row("VJ105", ["07:50", "", "", ""])], t(8, 30));
        let due = c.due(&alerts, &AlertHistory::default(), at(8, 30));
        let history = c.next_history(&alerts, &AlertHistory::default(), &due, at(8, 30));
        let cleared = c.next_history(&[], &history, &[], at(8, 40));
        assert!(cleared.alerts.is_empty());
    }
}

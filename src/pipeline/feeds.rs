// src/pipeline/feeds.rs

//! What happens to a batch of rows once the scheduler has fetched it.
//!
//! - `LegFeedPipeline`: tracker update, poll priority, stall alerts, leg
//!   status notification, tracker snapshot
//! - `FaultFeedPipeline`: correlation filter, fault summary notification

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::watch;

use crate::error::Result;
use crate::models::{AlertHistory, FaultRow, LegRow, PollPriority};
use crate::pipeline::fault_status::{FaultStatusData, FaultStatusMonitor};
use crate::pipeline::leg_status::{LegStatusData, LegStatusMonitor};
use crate::pipeline::notifier::ChangeDetectionNotifier;
use crate::services::{
    FaultCorrelationFilter, FlightLifecycleTracker, LegAlertChecker, Notification, Notifier,
};
use crate::storage::StateStore;

/// Consumer of fetched rows, driven by the scheduler.
#[async_trait]
pub trait FeedPipeline: Send {
    type Row: Send;

    fn name(&self) -> &str;

    /// Whether this tick should poll at all. Deferred ticks are not counted.
    fn ready(&self) -> bool {
        true
    }

    /// Handle one batch. `Ok(false)` marks the tick as failed without an error.
    async fn process(&mut self, date: NaiveDate, rows: Vec<Self::Row>, now: NaiveDateTime) -> Result<bool>;
}

pub struct LegFeedPipeline {
    tracker: FlightLifecycleTracker,
    alerts: Option<LegAlertChecker>,
    status: ChangeDetectionNotifier<LegStatusMonitor>,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn Notifier>,
    priority: watch::Sender<PollPriority>,
}

impl LegFeedPipeline {
    pub fn new(
        tracker: FlightLifecycleTracker,
        alerts: Option<LegAlertChecker>,
        status: ChangeDetectionNotifier<LegStatusMonitor>,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn Notifier>,
    ) -> Self {
        let (priority, _) = watch::channel(PollPriority::default());
        Self {
            tracker,
            alerts,
            status,
            store,
            sink,
            priority,
        }
    }

    /// Receiver for the latest poll priority.
    pub fn subscribe(&self) -> watch::Receiver<PollPriority> {
        self.priority.subscribe()
    }

    pub fn tracker(&self) -> &FlightLifecycleTracker {
        &self.tracker
    }

    /// Resume from a snapshot taken earlier the same day, if any.
    pub async fn restore(&mut self) -> Result<bool> {
        match self.store.load_snapshot().await? {
            Some(snapshot) => Ok(self.tracker.restore(snapshot)),
            None => Ok(false),
        }
    }

    fn publish_priority(&mut self, now: NaiveDateTime) {
        let decision = self.tracker.poll_decision(now);
        let previous = self.priority.send_replace(decision.priority);
        if previous != decision.priority {
            log::info!(
                "Poll priority {} -> {} ({})",
                previous,
                decision.priority,
                decision.reason
            );
        } else {
            log::debug!("Poll priority {} ({})", decision.priority, decision.reason);
        }
    }

    /// Send due stall alerts and rewrite the history. A failed send leaves
    /// the history as it was.
    async fn run_alerts(&self, rows: &[LegRow], now: NaiveDateTime) -> Result<()> {
        let Some(checker) = &self.alerts else {
            return Ok(());
        };

        let active = checker.check(rows, now.time());
        let history = match self.store.load_alert_history().await {
            Ok(history) => history,
            Err(e) => {
                log::warn!("Unreadable alert history, starting fresh: {}", e);
                AlertHistory::default()
            }
        };

        let due = checker.due(&active, &history, now);
        if !due.is_empty() {
            let lines = due.iter().map(|a| a.message.clone()).collect();
            let notification = Notification::new(format!("航段告警 - {}", now.date()), lines);
            if let Err(e) = self.sink.send(&notification).await {
                log::error!("Failed to deliver {} stall alert(s): {}", due.len(), e);
                return Ok(());
            }
            log::warn!("Sent {} stall alert(s)", due.len());
        }

        let next = checker.next_history(&active, &history, &due, now);
        if next.alerts != history.alerts {
            self.store.save_alert_history(&next).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FeedPipeline for LegFeedPipeline {
    type Row = LegRow;

    fn name(&self) -> &str {
        "leg"
    }

    async fn process(&mut self, date: NaiveDate, rows: Vec<LegRow>, now: NaiveDateTime) -> Result<bool> {
        self.tracker.roll_over(date);
        let report = self.tracker.update(&rows, now);
        log::debug!(
            "Leg rows: {} applied, {} ignored, {} changed, {} malformed cells",
            report.applied,
            report.ignored,
            report.changed,
            report.malformed
        );
        self.publish_priority(now);

        if let Err(e) = self.run_alerts(&rows, now).await {
            log::error!("Stall alert check failed: {}", e);
        }

        let outcome = self
            .status
            .cycle(Some(&LegStatusData::from_tracker(&self.tracker)), now)
            .await?;

        if let Err(e) = self.store.save_snapshot(&self.tracker.snapshot()).await {
            log::warn!("Failed to save tracker snapshot: {}", e);
        }
        Ok(outcome.is_success())
    }
}

pub struct FaultFeedPipeline {
    filter: FaultCorrelationFilter,
    status: ChangeDetectionNotifier<FaultStatusMonitor>,
    gate: Option<watch::Receiver<PollPriority>>,
}

impl FaultFeedPipeline {
    pub fn new(filter: FaultCorrelationFilter, status: ChangeDetectionNotifier<FaultStatusMonitor>) -> Self {
        Self {
            filter,
            status,
            gate: None,
        }
    }

    /// Only poll while the leg tracker reports FAULT priority.
    pub fn gated_by(mut self, priority: watch::Receiver<PollPriority>) -> Self {
        self.gate = Some(priority);
        self
    }
}

#[async_trait]
impl FeedPipeline for FaultFeedPipeline {
    type Row = FaultRow;

    fn name(&self) -> &str {
        "fault"
    }

    fn ready(&self) -> bool {
        self.gate
            .as_ref()
            .is_none_or(|rx| *rx.borrow() == PollPriority::Fault)
    }

    async fn process(&mut self, date: NaiveDate, rows: Vec<FaultRow>, now: NaiveDateTime) -> Result<bool> {
        let (kept, report) = self.filter.apply_with_report(&rows);
        if report.kept() != report.input {
            log::info!(
                "Fault filter: {} in, {} dropped by single rules, {} by group rules",
                report.input,
                report.dropped_single,
                report.dropped_group
            );
        }

        let data = FaultStatusData {
            date,
            rows: kept,
            report,
        };
        Ok(self.status.cycle(Some(&data), now).await?.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertConfig, DisplayConfig, FlightSchedule};
    use crate::pipeline::notifier::tests::RecordingSink;
    use crate::services::GroupRule;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    fn leg(aircraft: &str, flight: &str, times: [&str; 4]) -> LegRow {
        let cell = |v: &str| (!v.is_empty()).then(|| v.to_string());
        LegRow {
            aircraft: aircraft.into(),
            flight_number: flight.into(),
            out: cell(times[0]),
            off: cell(times[1]),
            on: cell(times[2]),
            in_gate: cell(times[3]),
            ..Default::default()
        }
    }

    fn leg_pipeline(tmp: &TempDir, sink: Arc<RecordingSink>) -> (LegFeedPipeline, Arc<LocalStorage>) {
        let schedule = Arc::new(FlightSchedule::default());
        let store = Arc::new(LocalStorage::new(tmp.path()));
        let tracker = FlightLifecycleTracker::new(
            Arc::clone(&schedule),
            vec!["B-652G".into(), "B-656E".into()],
            day(),
        );
        let alerts = LegAlertChecker::new(Arc::clone(&schedule), AlertConfig::default());
        let status = ChangeDetectionNotifier::new(
            LegStatusMonitor::new(schedule, DisplayConfig::default()),
            store.clone(),
            sink.clone(),
        );
        let pipeline = LegFeedPipeline::new(tracker, Some(alerts), status, store.clone(), sink);
        (pipeline, store)
    }

    #[tokio::test]
    async fn leg_pipeline_publishes_priority() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, _) = leg_pipeline(&tmp, sink.clone());
        let rx = pipeline.subscribe();

        let rows = vec![
            leg("B-652G", "VJ105", ["07:50", "08:00", "", ""]),
            leg("B-656E", "VJ107", ["09:20", "09:30", "", ""]),
        ];
        assert!(pipeline.process(day(), rows.clone(), at(9, 31)).await.unwrap());
        assert_eq!(*rx.borrow(), PollPriority::Fault);
        assert_eq!(sink.count(), 1);

        // B-652G now overdue (ETA 09:50)
        assert!(pipeline.process(day(), rows, at(9, 50)).await.unwrap());
        assert_eq!(*rx.borrow(), PollPriority::Leg);
        // Same content, no second status notification
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (mut first, _) = leg_pipeline(&tmp, sink.clone());
        first
            .process(day(), vec![leg("B-652G", "VJ105", ["07:50", "", "", ""])], at(7, 51))
            .await
            .unwrap();

        let (mut second, _) = leg_pipeline(&tmp, sink);
        assert!(second.restore().await.unwrap());
        assert_eq!(
            second.tracker().state("B-652G").unwrap().out,
            Some(at(7, 50))
        );
    }

    #[tokio::test]
    async fn stall_alert_sent_then_suppressed() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, store) = leg_pipeline(&tmp, sink.clone());
        let rows = vec![leg("B-652G", "VJ105", ["07:50", "", "", ""])];

        pipeline.process(day(), rows.clone(), at(8, 20)).await.unwrap();
        let alerts: Vec<_> = sink
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.subject.starts_with("航段告警"))
            .cloned()
            .collect();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].lines[0].contains("滑出30分钟仍未起飞"));

        let history = store.load_alert_history().await.unwrap();
        assert_eq!(history.alerts.get("B-652G_VJ105_OUT_WITHOUT_OFF"), Some(&at(8, 20)));

        // Within the resend interval: nothing new goes out
        let before = sink.count();
        pipeline.process(day(), rows, at(8, 22)).await.unwrap();
        assert_eq!(sink.count(), before);
    }

    fn fault(desc: &str, time: &str) -> FaultRow {
        FaultRow {
            aircraft: "B-652G".into(),
            flight_number: "VJ105".into(),
            description: desc.into(),
            trigger_time: time.into(),
            ..Default::default()
        }
    }

    fn fault_pipeline(tmp: &TempDir, sink: Arc<RecordingSink>) -> FaultFeedPipeline {
        let store = Arc::new(LocalStorage::new(tmp.path()));
        let filter = FaultCorrelationFilter::new(
            Vec::new(),
            vec![GroupRule {
                name: Some("bleed".into()),
                descriptions: vec!["BLEED 1".into(), "BLEED 2".into()],
            }],
        );
        let status = ChangeDetectionNotifier::new(
            FaultStatusMonitor::new(&DisplayConfig::default()),
            store,
            sink,
        );
        FaultFeedPipeline::new(filter, status)
    }

    #[tokio::test]
    async fn fault_pipeline_filters_before_summarising() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut pipeline = fault_pipeline(&tmp, sink.clone());

        let rows = vec![
            fault("BLEED 1 OVHT", "2026-03-01 08:10:05"),
            fault("BLEED 2 OVHT", "2026-03-01 08:10:40"),
            fault("PACK 1 FAULT", "2026-03-01 08:30:00"),
        ];
        assert!(pipeline.process(day(), rows, at(8, 31)).await.unwrap());

        let sent = sink.sent.lock().unwrap();
        let body = sent[0].body();
        assert!(body.contains("PACK 1 FAULT"));
        assert!(!body.contains("BLEED"));
        assert!(body.contains("共计: 1条故障记录"));
    }

    #[tokio::test]
    async fn fault_pipeline_waits_for_fault_priority() {
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = watch::channel(PollPriority::Leg);
        let pipeline = fault_pipeline(&tmp, Arc::new(RecordingSink::default())).gated_by(rx);
        assert!(!pipeline.ready());
        tx.send_replace(PollPriority::Fault);
        assert!(pipeline.ready());
    }
}

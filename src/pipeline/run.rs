// src/pipeline/run.rs

//! Monitor entry point: builds one scheduler per feed and runs them
//! side by side until the window closes or shutdown is requested.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio::sync::watch;

use crate::config::Runtime;
use crate::error::{AppError, Result};
use crate::models::{FaultRow, LegRow};
use crate::pipeline::fault_status::FaultStatusMonitor;
use crate::pipeline::feeds::{FaultFeedPipeline, LegFeedPipeline};
use crate::pipeline::leg_status::LegStatusMonitor;
use crate::pipeline::notifier::ChangeDetectionNotifier;
use crate::pipeline::scheduler::{PollingScheduler, SchedulerStats};
use crate::services::{FileFetcher, FlightLifecycleTracker, LegAlertChecker, Notifier, notifier};
use crate::storage::{LocalStorage, StateStore};
use crate::utils::log;
use crate::utils::time::Clock;

/// Which feeds to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedSelection {
    Leg,
    Fault,
    #[default]
    All,
}

impl FeedSelection {
    pub fn includes_leg(self) -> bool {
        matches!(self, Self::Leg | Self::All)
    }

    pub fn includes_fault(self) -> bool {
        matches!(self, Self::Fault | Self::All)
    }
}

impl fmt::Display for FeedSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Leg => "leg",
            Self::Fault => "fault",
            Self::All => "all",
        })
    }
}

type SchedulerRun = BoxFuture<'static, (String, Result<SchedulerStats>)>;

/// Build the leg pipeline, resuming today's tracker snapshot if present.
async fn leg_pipeline(
    runtime: &Runtime,
    clock: &dyn Clock,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn Notifier>,
) -> LegFeedPipeline {
    let config = &runtime.config;
    let schedule = Arc::clone(&runtime.schedule);

    let tracker = FlightLifecycleTracker::new(
        Arc::clone(&schedule),
        config.fleet.aircraft.clone(),
        clock.today(),
    );
    let alerts = config
        .alerts
        .enabled
        .then(|| LegAlertChecker::new(Arc::clone(&schedule), config.alerts.clone()));
    let status = ChangeDetectionNotifier::new(
        LegStatusMonitor::new(schedule, config.display.clone()),
        Arc::clone(&store),
        Arc::clone(&sink),
    )
    .with_subject_prefix(config.notify.subject_prefix.clone());

    let mut pipeline = LegFeedPipeline::new(tracker, alerts, status, store, sink);
    match pipeline.restore().await {
        Ok(true) => log::sub_item("Resumed tracker state from snapshot"),
        Ok(false) => {}
        Err(e) => ::log::warn!("Ignoring unreadable tracker snapshot: {}", e),
    }
    pipeline
}

/// Run the monitor until every scheduler has stopped.
pub async fn run_monitor(
    runtime: &Runtime,
    selection: FeedSelection,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<(String, SchedulerStats)>> {
    let config = &runtime.config;
    let paths = &runtime.paths;
    log::header(&format!("fleetwatch monitor ({} feeds)", selection));
    log::sub_item(&format!("Fleet: {}", config.fleet.aircraft.join(", ")));
    log::sub_item(&format!("State: {}", paths.state_dir.display()));

    let store: Arc<dyn StateStore> = Arc::new(LocalStorage::new(&paths.state_dir));
    let sink: Arc<dyn Notifier> = Arc::from(notifier::from_config(&config.notify)?);
    let filter_stats = runtime.filter.stats();
    log::sub_item(&format!(
        "Filter rules: {} single, {}/{} group effective",
        filter_stats.single_rules, filter_stats.effective_group_rules, filter_stats.group_rules
    ));

    let mut runs: Vec<SchedulerRun> = Vec::new();
    let mut priority = None;

    if selection.includes_leg() && config.feeds.leg.enabled {
        let pipeline = leg_pipeline(runtime, clock.as_ref(), Arc::clone(&store), Arc::clone(&sink)).await;
        priority = Some(pipeline.subscribe());

        let mut scheduler = PollingScheduler::new(
            FileFetcher::<LegRow>::new("leg", &paths.feed_dir),
            pipeline,
            config.scheduler.clone(),
            config.feeds.leg.interval(),
            config.fleet.aircraft.clone(),
            Arc::clone(&clock),
        );
        let rx = shutdown.clone();
        runs.push(async move { ("leg".to_string(), scheduler.run(rx).await) }.boxed());
    }

    if selection.includes_fault() && config.feeds.fault.enabled {
        let status = ChangeDetectionNotifier::new(
            FaultStatusMonitor::new(&config.display),
            Arc::clone(&store),
            Arc::clone(&sink),
        )
        .with_subject_prefix(config.notify.subject_prefix.clone());
        let mut pipeline = FaultFeedPipeline::new(runtime.filter.clone(), status);

        // Without a leg scheduler nothing would ever publish FAULT
        if config.feeds.gate_fault_on_priority {
            if let Some(rx) = priority.take() {
                log::sub_item("Fault polling gated on leg priority");
                pipeline = pipeline.gated_by(rx);
            }
        }

        let mut scheduler = PollingScheduler::new(
            FileFetcher::<FaultRow>::new("fault", &paths.feed_dir),
            pipeline,
            config.scheduler.clone(),
            config.feeds.fault.interval(),
            config.fleet.aircraft.clone(),
            Arc::clone(&clock),
        );
        let rx = shutdown.clone();
        runs.push(async move { ("fault".to_string(), scheduler.run(rx).await) }.boxed());
    }

    if runs.is_empty() {
        return Err(AppError::config(format!(
            "no enabled feeds for selection '{}'",
            selection
        )));
    }

    let mut stats = Vec::new();
    for (name, result) in join_all(runs).await {
        stats.push((name, result?));
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Config, FeedConfig, PathsConfig};
    use crate::services::FaultCorrelationFilter;
    use crate::utils::time::FixedClock;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn runtime(tmp: &TempDir) -> Runtime {
        let mut config = Config::default();
        config.scheduler.tick_slice_secs = 1;
        let paths = PathsConfig::default().resolved(tmp.path());
        std::fs::create_dir_all(&paths.feed_dir).unwrap();
        Runtime {
            config,
            paths,
            schedule: Default::default(),
            filter: FaultCorrelationFilter::default(),
        }
    }

    fn clock(h: u32) -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap(),
        ))
    }

    #[test]
    fn selection_covers_feeds() {
        assert!(FeedSelection::All.includes_leg() && FeedSelection::All.includes_fault());
        assert!(!FeedSelection::Leg.includes_fault());
        assert!(!FeedSelection::Fault.includes_leg());
    }

    #[tokio::test]
    async fn replays_leg_feed_until_shutdown() {
        let tmp = TempDir::new().unwrap();
        let runtime = runtime(&tmp);
        std::fs::write(
            runtime.paths.feed_dir.join("leg_2026-03-01.json"),
            r#"[{"机号":"B-652G","航班号":"VJ105","OUT":"07:50","OFF":"08:00"}]"#,
        )
        .unwrap();

        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn({
            let runtime = runtime.clone();
            async move { run_monitor(&runtime, FeedSelection::Leg, clock(9), rx).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let stats = run.await.unwrap().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].0, "leg");
        assert_eq!(stats[0].1.success_count, 1);
        assert!(runtime.paths.state_dir.join("leg_status_state.json").exists());
        assert!(runtime.paths.state_dir.join("tracker_snapshot.json").exists());
    }

    #[tokio::test]
    async fn nothing_enabled_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut runtime = runtime(&tmp);
        runtime.config.feeds.fault = FeedConfig {
            enabled: false,
            interval_secs: 300,
        };
        let (_tx, rx) = watch::channel(false);
        assert!(run_monitor(&runtime, FeedSelection::Fault, clock(9), rx).await.is_err());
    }
}

// src/pipeline/scheduler.rs

//! Resilient polling loop for one feed.
//!
//! ## Lifecycle
//!
//! ```text
//! Init ──► WaitStart ──► Polling ──► Stopped
//!   └──────────────────────►┘
//! ```
//!
//! Each tick whose interval has elapsed probes the pooled connection,
//! reconnects with bounded retries when the probe fails, fetches, and hands
//! the rows to the feed pipeline. Nothing inside a tick stops the loop;
//! only the end of the daily window or a shutdown signal does.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::SchedulerConfig;
use crate::pipeline::feeds::FeedPipeline;
use crate::services::Fetcher;
use crate::utils::log;
use crate::utils::time::{Clock, format_hhmm};

/// Live connection handles, keyed by feed name.
///
/// Each scheduler owns its own pool; reconnecting only ever replaces this
/// instance's entry.
#[derive(Debug)]
pub struct ConnectionPool<H> {
    handles: HashMap<String, H>,
}

impl<H> Default for ConnectionPool<H> {
    fn default() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }
}

impl<H> ConnectionPool<H> {
    pub fn get(&self, key: &str) -> Option<&H> {
        self.handles.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut H> {
        self.handles.get_mut(key)
    }

    pub fn insert(&mut self, key: &str, handle: H) {
        self.handles.insert(key.to_string(), handle);
    }

    pub fn remove(&mut self, key: &str) -> Option<H> {
        self.handles.remove(key)
    }
}

/// Counters for one scheduler instance. Reset only by a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub fetch_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub reconnect_count: u64,
}

impl SchedulerStats {
    /// Percentage of counted ticks that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.fetch_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.fetch_count as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Init,
    WaitStart,
    Polling,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::WaitStart => "WAIT_START",
            Self::Polling => "POLLING",
            Self::Stopped => "STOPPED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Pipeline asked to skip this tick
    Deferred,
    Success,
    Failed,
}

pub struct PollingScheduler<F: Fetcher, P> {
    fetcher: F,
    pipeline: P,
    config: SchedulerConfig,
    interval: Duration,
    fleet: Vec<String>,
    clock: Arc<dyn Clock>,
    pool: ConnectionPool<F::Handle>,
    stats: SchedulerStats,
    state: SchedulerState,
    last_poll: Option<Instant>,
}

impl<F, P> PollingScheduler<F, P>
where
    F: Fetcher,
    P: FeedPipeline<Row = F::Row>,
{
    pub fn new(
        fetcher: F,
        pipeline: P,
        config: SchedulerConfig,
        interval: Duration,
        fleet: Vec<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fetcher,
            pipeline,
            config,
            interval,
            fleet,
            clock,
            pool: ConnectionPool::default(),
            stats: SchedulerStats::default(),
            state: SchedulerState::Init,
            last_poll: None,
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    fn name(&self) -> String {
        self.fetcher.name().to_string()
    }

    /// Fresh connect + login. A refused login or any error fails the attempt.
    async fn connect(&mut self) -> Result<()> {
        let name = self.name();
        let mut handle = self.fetcher.connect().await?;
        if !self.fetcher.login(&mut handle).await? {
            return Err(AppError::connection(&name, "login refused"));
        }
        self.pool.insert(&name, handle);
        Ok(())
    }

    /// Drop this instance's handle and retry `connect` + `login`.
    async fn reconnect(&mut self) -> Result<()> {
        let name = self.name();
        self.pool.remove(&name);
        let attempts = self.config.max_reconnect_attempts;

        for attempt in 1..=attempts {
            match self.connect().await {
                Ok(()) => {
                    self.stats.reconnect_count += 1;
                    ::log::info!("{}: reconnected on attempt {}/{}", name, attempt, attempts);
                    return Ok(());
                }
                Err(e) => {
                    ::log::warn!("{}: reconnect attempt {}/{} failed: {}", name, attempt, attempts, e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }
        Err(AppError::connection(
            &name,
            format!("gave up after {} reconnect attempts", attempts),
        ))
    }

    /// Probe the pooled handle; reconnect when it is missing or dead.
    async fn ensure_connection(&mut self) -> Result<()> {
        let name = self.name();
        let alive = match self.pool.get(&name) {
            Some(handle) => match self.fetcher.probe(handle).await {
                Ok(()) => true,
                Err(e) => {
                    ::log::warn!("{}: connection probe failed: {}", name, e);
                    false
                }
            },
            None => false,
        };
        if alive { Ok(()) } else { self.reconnect().await }
    }

    async fn poll_once(&mut self) -> Result<bool> {
        self.ensure_connection().await?;

        let name = self.name();
        let date = self.clock.today();
        let Some(handle) = self.pool.get_mut(&name) else {
            return Err(AppError::connection(&name, "no pooled connection"));
        };

        let rows = match self.fetcher.fetch(handle, date, &self.fleet).await {
            Ok(rows) => rows,
            Err(e) => {
                if e.is_connection() {
                    self.pool.remove(&name);
                }
                return Err(e);
            }
        };

        let Some(rows) = rows else {
            return Err(AppError::data_unavailable(format!("{} has no rows for {}", name, date)));
        };
        ::log::debug!("{}: fetched {} rows", name, rows.len());
        self.pipeline.process(date, rows, self.clock.now()).await
    }

    /// One tick, regardless of the polling interval.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.pipeline.ready() {
            ::log::debug!("{}: deferred by pipeline", self.pipeline.name());
            return TickOutcome::Deferred;
        }

        self.stats.fetch_count += 1;
        self.last_poll = Some(Instant::now());

        match self.poll_once().await {
            Ok(true) => {
                self.stats.success_count += 1;
                TickOutcome::Success
            }
            Ok(false) => {
                self.stats.failure_count += 1;
                TickOutcome::Failed
            }
            Err(e) => {
                ::log::error!("{}: tick failed: {}", self.name(), e);
                self.stats.failure_count += 1;
                TickOutcome::Failed
            }
        }
    }

    fn interval_elapsed(&self) -> bool {
        self.last_poll
            .is_none_or(|last| last.elapsed() >= self.interval)
    }

    /// Sleep for `duration` unless shutdown is requested first. Returns
    /// true when the loop should stop.
    async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    fn log_stats(&self) {
        let stats = self.stats;
        log::summary(
            &format!("{} scheduler stats", self.name()),
            &[
                ("Fetches", stats.fetch_count.to_string()),
                ("Succeeded", stats.success_count.to_string()),
                ("Failed", stats.failure_count.to_string()),
                ("Reconnects", stats.reconnect_count.to_string()),
                ("Success rate", format!("{:.1}%", stats.success_rate())),
            ],
        );
    }

    /// Run until the end of the daily window or until `shutdown` flips to
    /// true, then return the final stats.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<SchedulerStats> {
        let start = self.config.start()?;
        let end = self.config.end()?;
        let name = self.name();

        self.state = SchedulerState::Init;
        log::header(&format!("{} scheduler", name));
        log::sub_item(&format!(
            "window {}-{}, every {}s",
            format_hhmm(start),
            format_hhmm(end),
            self.interval.as_secs()
        ));
        if let Err(e) = self.connect().await {
            // The first tick's reconnect path takes over
            ::log::warn!("{}: initial connection failed: {}", name, e);
        }

        loop {
            let now = self.clock.now().time();

            if now < start {
                if self.state != SchedulerState::WaitStart {
                    ::log::info!("{}: waiting for {}", name, format_hhmm(start));
                    self.state = SchedulerState::WaitStart;
                }
                if Self::pause(until(now, start).min(self.config.tick_slice()), &mut shutdown).await {
                    break;
                }
                continue;
            }
            if now >= end {
                ::log::info!("{}: end of polling window {}", name, format_hhmm(end));
                break;
            }

            if self.state != SchedulerState::Polling {
                ::log::info!("{}: polling", name);
                self.state = SchedulerState::Polling;
            }
            if self.interval_elapsed() {
                self.tick().await;
            }
            if Self::pause(self.config.tick_slice(), &mut shutdown).await {
                ::log::info!("{}: shutdown requested", name);
                break;
            }
        }

        self.state = SchedulerState::Stopped;
        self.log_stats();
        Ok(self.stats)
    }
}

/// Time from `now` until `target` on the same day.
fn until(now: NaiveTime, target: NaiveTime) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::FixedClock;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fetcher whose failures are scripted by counters.
    #[derive(Default)]
    struct ScriptedFetcher {
        probe_failures: AtomicU32,
        connect_failures: AtomicU32,
        connects: AtomicU32,
        no_data: bool,
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        type Handle = u32;
        type Row = String;

        fn name(&self) -> &str {
            "scripted"
        }

        async fn connect(&self) -> Result<u32> {
            if self.connect_failures.load(Ordering::SeqCst) > 0 {
                self.connect_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::connection("scripted", "refused"));
            }
            Ok(self.connects.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn login(&self, _handle: &mut u32) -> Result<bool> {
            Ok(true)
        }

        async fn probe(&self, _handle: &u32) -> Result<()> {
            if self.probe_failures.load(Ordering::SeqCst) > 0 {
                self.probe_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::connection("scripted", "stale session"));
            }
            Ok(())
        }

        async fn fetch(
            &self,
            handle: &mut u32,
            _date: NaiveDate,
            _aircraft: &[String],
        ) -> Result<Option<Vec<String>>> {
            if self.no_data {
                return Ok(None);
            }
            Ok(Some(vec![format!("row from connection {}", handle)]))
        }
    }

    #[derive(Default)]
    struct CollectingPipeline {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
        deferred: bool,
    }

    #[async_trait]
    impl FeedPipeline for CollectingPipeline {
        type Row = String;

        fn name(&self) -> &str {
            "collecting"
        }

        fn ready(&self) -> bool {
            !self.deferred
        }

        async fn process(&mut self, _date: NaiveDate, rows: Vec<String>, _now: NaiveDateTime) -> Result<bool> {
            self.batches.lock().unwrap().push(rows);
            Ok(true)
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            max_reconnect_attempts: 3,
            retry_delay_secs: 0,
            tick_slice_secs: 1,
            ..Default::default()
        }
    }

    fn clock(h: u32, m: u32) -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        ))
    }

    fn scheduler(
        fetcher: ScriptedFetcher,
        pipeline: CollectingPipeline,
    ) -> PollingScheduler<ScriptedFetcher, CollectingPipeline> {
        PollingScheduler::new(
            fetcher,
            pipeline,
            config(),
            Duration::ZERO,
            vec!["B-652G".into()],
            clock(9, 0),
        )
    }

    #[tokio::test]
    async fn dead_probe_triggers_one_reconnect() {
        let fetcher = ScriptedFetcher::default();
        let mut s = scheduler(fetcher, CollectingPipeline::default());
        s.connect().await.unwrap();

        s.fetcher.probe_failures.store(1, Ordering::SeqCst);
        assert_eq!(s.tick().await, TickOutcome::Success);
        assert_eq!(s.stats().reconnect_count, 1);
        assert_eq!(s.stats().failure_count, 0);

        // The batch came from the fresh connection
        let batches = s.pipeline().batches.lock().unwrap().clone();
        assert_eq!(batches, vec![vec!["row from connection 2".to_string()]]);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_tick_only() {
        let fetcher = ScriptedFetcher {
            connect_failures: AtomicU32::new(10),
            ..Default::default()
        };
        let mut s = scheduler(fetcher, CollectingPipeline::default());

        assert_eq!(s.tick().await, TickOutcome::Failed);
        let stats = s.stats();
        assert_eq!(stats.fetch_count, 1);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.reconnect_count, 0);
        // Three attempts were made
        assert_eq!(s.fetcher.connect_failures.load(Ordering::SeqCst), 7);

        // Source recovers: the next tick reconnects and succeeds
        s.fetcher.connect_failures.store(0, Ordering::SeqCst);
        assert_eq!(s.tick().await, TickOutcome::Success);
        assert_eq!(s.stats().success_count, 1);
    }

    #[tokio::test]
    async fn missing_data_counts_as_failure() {
        let fetcher = ScriptedFetcher {
            no_data: true,
            ..Default::default()
        };
        let mut s = scheduler(fetcher, CollectingPipeline::default());
        assert_eq!(s.tick().await, TickOutcome::Failed);
        assert_eq!(s.stats().failure_count, 1);
        assert!(s.pipeline().batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deferred_ticks_are_not_counted() {
        let pipeline = CollectingPipeline {
            deferred: true,
            ..Default::default()
        };
        let mut s = scheduler(ScriptedFetcher::default(), pipeline);
        assert_eq!(s.tick().await, TickOutcome::Deferred);
        assert_eq!(s.stats(), SchedulerStats::default());

        s.pipeline_mut().deferred = false;
        assert_eq!(s.tick().await, TickOutcome::Success);
        assert_eq!(s.stats().fetch_count, 1);
    }

    #[tokio::test]
    async fn run_stops_after_end_of_window() {
        let mut s = PollingScheduler::new(
            ScriptedFetcher::default(),
            CollectingPipeline::default(),
            config(),
            Duration::ZERO,
            vec!["B-652G".into()],
            clock(23, 59),
        );
        let (_tx, rx) = watch::channel(false);
        let stats = s.run(rx).await.unwrap();
        assert_eq!(s.state(), SchedulerState::Stopped);
        assert_eq!(stats.fetch_count, 0);
    }

    #[tokio::test]
    async fn run_honours_shutdown() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let pipeline = CollectingPipeline {
            batches: Arc::clone(&batches),
            deferred: false,
        };
        let mut s = scheduler(ScriptedFetcher::default(), pipeline);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { s.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert!(stats.fetch_count >= 1);
        assert_eq!(stats.failure_count, 0);
        assert!(!batches.lock().unwrap().is_empty());
    }

    #[test]
    fn success_rate_handles_zero() {
        assert_eq!(SchedulerStats::default().success_rate(), 0.0);
        let stats = SchedulerStats {
            fetch_count: 4,
            success_count: 3,
            failure_count: 1,
            reconnect_count: 0,
        };
        assert_eq!(stats.success_rate(), 75.0);
    }
}

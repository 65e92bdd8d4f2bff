//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::time::parse_hhmm;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daily polling window and reconnect policy
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-feed polling cadence
    #[serde(default)]
    pub feeds: FeedsConfig,

    /// Aircraft to track
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Input and state file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Notification delivery
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Status message rendering
    #[serde(default)]
    pub display: DisplayConfig,

    /// Stalled-leg alert thresholds
    #[serde(default)]
    pub alerts: AlertConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let start = self.scheduler.start()?;
        let end = self.scheduler.end()?;
        if start >= end {
            return Err(AppError::validation(format!(
                "scheduler.start_time {} must be before end_time {}",
                self.scheduler.start_time, self.scheduler.end_time
            )));
        }
        if self.scheduler.tick_slice_secs == 0 {
            return Err(AppError::validation("scheduler.tick_slice_secs must be > 0"));
        }
        if self.scheduler.max_reconnect_attempts == 0 {
            return Err(AppError::validation(
                "scheduler.max_reconnect_attempts must be > 0",
            ));
        }
        if self.feeds.leg.interval_secs == 0 {
            return Err(AppError::validation("feeds.leg.interval_secs must be > 0"));
        }
        if self.feeds.fault.interval_secs == 0 {
            return Err(AppError::validation("feeds.fault.interval_secs must be > 0"));
        }
        if self.fleet.aircraft.is_empty() {
            return Err(AppError::validation("No aircraft defined"));
        }
        if self.fleet.aircraft.iter().any(|a| a.trim().is_empty()) {
            return Err(AppError::validation("fleet.aircraft contains a blank entry"));
        }
        #[cfg(feature = "webhook")]
        if let Some(url) = &self.notify.webhook_url {
            url::Url::parse(url)?;
        }
        if self.alerts.resend_interval_secs == 0 {
            return Err(AppError::validation("alerts.resend_interval_secs must be > 0"));
        }
        Ok(())
    }
}

/// Daily window and reconnect policy shared by every scheduler instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// `HH:MM` at which polling begins
    #[serde(default = "defaults::start_time")]
    pub start_time: String,

    /// `HH:MM` at which polling stops for the day
    #[serde(default = "defaults::end_time")]
    pub end_time: String,

    /// Sleep between loop iterations
    #[serde(default = "defaults::tick_slice")]
    pub tick_slice_secs: u64,

    /// Connect+login attempts before a tick is failed
    #[serde(default = "defaults::max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Delay between reconnect attempts
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_secs: u64,
}

impl SchedulerConfig {
    pub fn start(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.start_time).ok_or_else(|| {
            AppError::validation(format!("invalid scheduler.start_time '{}'", self.start_time))
        })
    }

    pub fn end(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.end_time).ok_or_else(|| {
            AppError::validation(format!("invalid scheduler.end_time '{}'", self.end_time))
        })
    }

    pub fn tick_slice(&self) -> Duration {
        Duration::from_secs(self.tick_slice_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            start_time: defaults::start_time(),
            end_time: defaults::end_time(),
            tick_slice_secs: defaults::tick_slice(),
            max_reconnect_attempts: defaults::max_reconnect_attempts(),
            retry_delay_secs: defaults::retry_delay(),
        }
    }
}

/// Cadence for one feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Minimum time between polls
    pub interval_secs: u64,
}

impl FeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    #[serde(default = "defaults::leg_feed")]
    pub leg: FeedConfig,

    #[serde(default = "defaults::fault_feed")]
    pub fault: FeedConfig,

    /// Only poll faults when the leg tracker says no ground transition is pending
    #[serde(default = "defaults::enabled")]
    pub gate_fault_on_priority: bool,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            leg: defaults::leg_feed(),
            fault: defaults::fault_feed(),
            gate_fault_on_priority: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "defaults::aircraft")]
    pub aircraft: Vec<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            aircraft: defaults::aircraft(),
        }
    }
}

/// File locations, relative to the config file's directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::state_dir")]
    pub state_dir: PathBuf,

    /// Directory of `{feed}_{YYYY-MM-DD}.json` replay files
    #[serde(default = "defaults::feed_dir")]
    pub feed_dir: PathBuf,

    #[serde(default = "defaults::schedule_file")]
    pub schedule_file: PathBuf,

    #[serde(default = "defaults::single_rules_file")]
    pub single_rules_file: PathBuf,

    #[serde(default = "defaults::group_rules_file")]
    pub group_rules_file: PathBuf,
}

impl PathsConfig {
    /// Resolve every relative path against `base`.
    pub fn resolved(&self, base: &Path) -> Self {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self {
            state_dir: join(&self.state_dir),
            feed_dir: join(&self.feed_dir),
            schedule_file: join(&self.schedule_file),
            single_rules_file: join(&self.single_rules_file),
            group_rules_file: join(&self.group_rules_file),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: defaults::state_dir(),
            feed_dir: defaults::feed_dir(),
            schedule_file: defaults::schedule_file(),
            single_rules_file: defaults::single_rules_file(),
            group_rules_file: defaults::group_rules_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// POST target; console output only when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "defaults::subject_prefix")]
    pub subject_prefix: String,

    #[serde(default = "defaults::notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            subject_prefix: defaults::subject_prefix(),
            timeout_secs: defaults::notify_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Minutes added to feed times when rendering (feed is UTC+8, crews read UTC+7)
    #[serde(default = "defaults::display_offset")]
    pub offset_minutes: i64,

    #[serde(default = "defaults::zone_label")]
    pub zone_label: String,

    /// Fault lines shown per flight before collapsing
    #[serde(default = "defaults::max_fault_lines")]
    pub max_fault_lines: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            offset_minutes: defaults::display_offset(),
            zone_label: defaults::zone_label(),
            max_fault_lines: defaults::max_fault_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::stall_minutes")]
    pub out_off_minutes: i64,

    /// Added to the scheduled duration
    #[serde(default = "defaults::stall_minutes")]
    pub off_on_grace_minutes: i64,

    #[serde(default = "defaults::stall_minutes")]
    pub on_in_minutes: i64,

    #[serde(default = "defaults::resend_interval")]
    pub resend_interval_secs: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            out_off_minutes: defaults::stall_minutes(),
            off_on_grace_minutes: defaults::stall_minutes(),
            on_in_minutes: defaults::stall_minutes(),
            resend_interval_secs: defaults::resend_interval(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::FeedConfig;

    pub fn enabled() -> bool {
        true
    }

    // Scheduler defaults
    pub fn start_time() -> String {
        "06:00".into()
    }
    pub fn end_time() -> String {
        "23:59".into()
    }
    pub fn tick_slice() -> u64 {
        10
    }
    pub fn max_reconnect_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        3
    }

    // Feed defaults
    pub fn leg_feed() -> FeedConfig {
        FeedConfig {
            enabled: true,
            interval_secs: 60,
        }
    }
    pub fn fault_feed() -> FeedConfig {
        FeedConfig {
            enabled: true,
            interval_secs: 300,
        }
    }

    pub fn aircraft() -> Vec<String> {
        vec!["B-652G".into(), "B-656E".into()]
    }

    // Path defaults
    pub fn state_dir() -> PathBuf {
        "state".into()
    }
    pub fn feed_dir() -> PathBuf {
        "feeds".into()
    }
    pub fn schedule_file() -> PathBuf {
        "schedule.toml".into()
    }
    pub fn single_rules_file() -> PathBuf {
        "fault_filter_rules.toml".into()
    }
    pub fn group_rules_file() -> PathBuf {
        "fault_group_filter_rules.toml".into()
    }

    // Notification defaults
    pub fn subject_prefix() -> String {
        "[fleetwatch]".into()
    }
    pub fn notify_timeout() -> u64 {
        10
    }

    // Display defaults
    pub fn display_offset() -> i64 {
        -60
    }
    pub fn zone_label() -> String {
        "越南时间".into()
    }
    pub fn max_fault_lines() -> usize {
        10
    }

    // Alert defaults
    pub fn stall_minutes() -> i64 {
        30
    }
    pub fn resend_interval() -> i64 {
        300
    }
}

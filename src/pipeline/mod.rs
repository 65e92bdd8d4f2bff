//! Polling and notification pipeline.
//!
//! - `scheduler`: resilient per-feed polling loop
//! - `feeds`: what each feed does with fetched rows
//! - `notifier`: hash-based change detection around a content generator
//! - `leg_status` / `fault_status`: content generators
//! - `run`: wires everything together for the CLI

pub mod fault_status;
pub mod feeds;
pub mod leg_status;
pub mod notifier;
pub mod run;
pub mod scheduler;

pub use feeds::{FaultFeedPipeline, FeedPipeline, LegFeedPipeline};
pub use notifier::{ChangeDetectionNotifier, CycleOutcome, StatusMonitor};
pub use run::{FeedSelection, run_monitor};
pub use scheduler::{ConnectionPool, PollingScheduler, SchedulerState, SchedulerStats, TickOutcome};

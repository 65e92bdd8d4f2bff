// src/models/mod.rs

//! Domain models for the fleet monitor.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod anomaly;
mod config;
mod flight;
mod rows;
mod schedule;
mod state;

// Re-export all public types
pub use anomaly::{Anomaly, AnomalyKind, AnomalyRecord, LegKey};
pub use config::{
    AlertConfig, Config, DisplayConfig, FeedConfig, FeedsConfig, FleetConfig, NotifyConfig,
    PathsConfig, SchedulerConfig,
};
pub use flight::{FlightLifecycleState, FlightPhase, LegProgress, PollPriority};
pub use rows::{FaultColumn, FaultRow, FeedRow, LegRow};
pub use schedule::{Airport, FlightLeg, FlightSchedule, RouteChain};
pub use state::{AlertHistory, NotificationState, TrackerSnapshot};

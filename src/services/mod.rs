//! Service layer for the monitor.
//!
//! This module contains the domain logic for:
//! - Flight leg tracking and poll priority (`FlightLifecycleTracker`)
//! - Route anomaly detection (`AnomalyDetector`)
//! - Fault row suppression (`FaultCorrelationFilter`)
//! - Stalled-leg alerts (`LegAlertChecker`)
//! - Feed sources (`Fetcher`) and notification sinks (`Notifier`)

pub mod alerts;
pub mod anomaly;
pub mod fault_filter;
pub mod fetcher;
pub mod notifier;
pub mod tracker;

pub use alerts::{LegAlert, LegAlertChecker, StallKind};
pub use anomaly::AnomalyDetector;
pub use fault_filter::{FaultCorrelationFilter, FilterReport, FilterStats, GroupRule, SingleRule};
pub use fetcher::{FileFetcher, FileSession, Fetcher};
pub use notifier::{ConsoleNotifier, Notification, Notifier};
#[cfg(feature = "webhook")]
pub use notifier::WebhookNotifier;
pub use tracker::{AircraftStatus, FlightLifecycleTracker, PollDecision, UpdateReport};

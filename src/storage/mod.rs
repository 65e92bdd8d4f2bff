//! Storage abstractions for cross-cycle state.
//!
//! Every scheduler instance owns its own files, so there is exactly one
//! writer per file and no locking.
//!
//! ## Directory Structure
//!
//! ```text
//! state/
//! ├── leg_status_state.json      # Last delivered leg status digest
//! ├── fault_status_state.json    # Last delivered fault summary digest
//! ├── leg_alert_history.json     # Stall alert send times
//! └── tracker_snapshot.json      # Tracker legs for same-day restarts
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AlertHistory, NotificationState, TrackerSnapshot};

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Last delivered state for a monitor kind (`leg`, `fault`).
    async fn load_notification_state(&self, kind: &str) -> Result<Option<NotificationState>>;

    /// Persist state after a successful send.
    async fn save_notification_state(&self, kind: &str, state: &NotificationState) -> Result<()>;

    /// Alert send history; empty when nothing was stored yet.
    async fn load_alert_history(&self) -> Result<AlertHistory>;

    async fn save_alert_history(&self, history: &AlertHistory) -> Result<()>;

    async fn load_snapshot(&self) -> Result<Option<TrackerSnapshot>>;

    async fn save_snapshot(&self, snapshot: &TrackerSnapshot) -> Result<()>;
}

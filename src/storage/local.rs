//! Local filesystem storage implementation.
//!
//! Files are written to a temp sibling first and renamed into place, so a
//! crash mid-write leaves the previous version intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{AlertHistory, NotificationState, TrackerSnapshot};
use crate::storage::StateStore;

const ALERT_HISTORY: &str = "leg_alert_history.json";
const SNAPSHOT: &str = "tracker_snapshot.json";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn state_key(kind: &str) -> String {
        format!("{}_status_state.json", kind)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StateStore for LocalStorage {
    async fn load_notification_state(&self, kind: &str) -> Result<Option<NotificationState>> {
        self.read_json(&Self::state_key(kind)).await
    }

    async fn save_notification_state(&self, kind: &str, state: &NotificationState) -> Result<()> {
        self.write_json(&Self::state_key(kind), state).await?;
        log::debug!("Saved {} status state ({})", kind, &state.status_hash[..8.min(state.status_hash.len())]);
        Ok(())
    }

    async fn load_alert_history(&self) -> Result<AlertHistory> {
        Ok(self.read_json(ALERT_HISTORY).await?.unwrap_or_default())
    }

    async fn save_alert_history(&self, history: &AlertHistory) -> Result<()> {
        self.write_json(ALERT_HISTORY, history).await
    }

    async fn load_snapshot(&self) -> Result<Option<TrackerSnapshot>> {
        self.read_json(SNAPSHOT).await
    }

    async fn save_snapshot(&self, snapshot: &TrackerSnapshot) -> Result<()> {
        self.write_json(SNAPSHOT, snapshot).await
    }
}

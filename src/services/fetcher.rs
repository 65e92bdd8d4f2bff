// src/services/fetcher.rs

//! Feed source abstraction.
//!
//! The scheduler only needs four capabilities from a source: open a
//! connection, authenticate it, check that it is still alive, and pull the
//! rows for a date. [`FileFetcher`] implements them over a directory of
//! JSON exports so the whole pipeline can run without the live portal.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::FeedRow;

/// A pollable feed source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Live connection state owned by the scheduler's pool.
    type Handle: Send + Sync;

    /// Typed row produced by [`fetch`](Self::fetch).
    type Row: Send;

    /// Feed name for logs and pool keys.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<Self::Handle>;

    /// Authenticate a fresh handle. `Ok(false)` means credentials were refused.
    async fn login(&self, handle: &mut Self::Handle) -> Result<bool>;

    /// Cheap liveness check. Any error marks the handle dead.
    async fn probe(&self, handle: &Self::Handle) -> Result<()>;

    /// Rows for `date`, restricted to `aircraft`. `Ok(None)` means the
    /// source had nothing for that date.
    async fn fetch(
        &self,
        handle: &mut Self::Handle,
        date: NaiveDate,
        aircraft: &[String],
    ) -> Result<Option<Vec<Self::Row>>>;
}

/// Session over a replay directory.
#[derive(Debug, Clone)]
pub struct FileSession {
    dir: PathBuf,
    authenticated: bool,
}

/// Reads `{feed}_{YYYY-MM-DD}.json` files holding an array of rows.
#[derive(Debug)]
pub struct FileFetcher<R> {
    feed: String,
    dir: PathBuf,
    _row: PhantomData<fn() -> R>,
}

impl<R> FileFetcher<R> {
    pub fn new(feed: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            feed: feed.into(),
            dir: dir.into(),
            _row: PhantomData,
        }
    }

    /// File holding the rows for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", self.feed, date.format("%Y-%m-%d")))
    }

    async fn check_dir(&self, dir: &Path) -> Result<()> {
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(AppError::connection(
                &self.feed,
                format!("{} is not a directory", dir.display()),
            )),
            Err(e) => Err(AppError::connection(
                &self.feed,
                format!("{}: {}", dir.display(), e),
            )),
        }
    }
}

#[async_trait]
impl<R> Fetcher for FileFetcher<R>
where
    R: DeserializeOwned + FeedRow + Send + 'static,
{
    type Handle = FileSession;
    type Row = R;

    fn name(&self) -> &str {
        &self.feed
    }

    async fn connect(&self) -> Result<FileSession> {
        self.check_dir(&self.dir).await?;
        Ok(FileSession {
            dir: self.dir.clone(),
            authenticated: false,
        })
    }

    async fn login(&self, handle: &mut FileSession) -> Result<bool> {
        handle.authenticated = true;
        Ok(true)
    }

    async fn probe(&self, handle: &FileSession) -> Result<()> {
        if !handle.authenticated {
            return Err(AppError::connection(&self.feed, "session not logged in"));
        }
        self.check_dir(&handle.dir).await
    }

    async fn fetch(
        &self,
        _handle: &mut FileSession,
        date: NaiveDate,
        aircraft: &[String],
    ) -> Result<Option<Vec<R>>> {
        let path = self.path_for(date);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No {} export at {}", self.feed, path.display());
                return Ok(None);
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let values: Vec<Value> = serde_json::from_slice(&bytes)?;
        let total = values.len();
        let mut skipped = 0;
        let mut rows = Vec::with_capacity(total);
        for (index, value) in values.into_iter().enumerate() {
            match decode_row::<R>(&self.feed, index, value) {
                Ok(row) => {
                    if aircraft.iter().any(|a| a == row.aircraft()) {
                        rows.push(row);
                    }
                }
                Err(e) => {
                    log::warn!("{}", e);
                    skipped += 1;
                }
            }
        }
        log::debug!(
            "Read {} {} rows ({} for tracked aircraft, {} skipped)",
            total,
            self.feed,
            rows.len(),
            skipped
        );
        Ok(Some(rows))
    }
}

/// Decode one exported row; a malformed row is `DataUnavailable`.
fn decode_row<R: DeserializeOwned>(feed: &str, index: usize, value: Value) -> Result<R> {
    serde_json::from_value(value)
        .map_err(|e| AppError::data_unavailable(format!("{} row {} skipped: {}", feed, index, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LegRow;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn fetch_filters_by_aircraft() {
        let tmp = TempDir::new().unwrap();
        let fetcher: FileFetcher<LegRow> = FileFetcher::new("leg", tmp.path());
        std::fs::write(
            fetcher.path_for(date()),
            r#"[{"机号":"B-652G","航班号":"VJ105","OUT":"07:50"},
                {"机号":"B-000X","航班号":"VJ301","OUT":"07:55"}]"#,
        )
        .unwrap();

        let mut handle = fetcher.connect().await.unwrap();
        assert!(fetcher.login(&mut handle).await.unwrap());
        fetcher.probe(&handle).await.unwrap();

        let rows = fetcher
            .fetch(&mut handle, date(), &["B-652G".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].flight_number, "VJ105");
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let fetcher: FileFetcher<LegRow> = FileFetcher::new("leg", tmp.path());
        std::fs::write(
            fetcher.path_for(date()),
            r#"[{"机号":"B-652G","航班号":"VJ105","OUT":"07:50"},
                {"机号":"B-656E","OUT":"09:20"},
                {"机号":"B-656E","航班号":17}]"#,
        )
        .unwrap();

        let mut handle = fetcher.connect().await.unwrap();
        fetcher.login(&mut handle).await.unwrap();
        let fleet = ["B-652G".to_string(), "B-656E".to_string()];
        let rows = fetcher
            .fetch(&mut handle, date(), &fleet)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].aircraft, "B-652G");
        assert_eq!(rows[0].flight_number, "VJ105");
    }

    #[test]
    fn bad_row_is_data_unavailable() {
        let err = decode_row::<LegRow>("leg", 3, serde_json::json!({"机号": "B-656E"})).unwrap_err();
        assert!(matches!(err, AppError::DataUnavailable(_)));
        assert!(err.to_string().contains("leg row 3"));
    }

    #[tokio::test]
    async fn missing_export_is_none() {
        let tmp = TempDir::new().unwrap();
        let fetcher: FileFetcher<LegRow> = FileFetcher::new("leg", tmp.path());
        let mut handle = fetcher.connect().await.unwrap();
        let rows = fetcher.fetch(&mut handle, date(), &[]).await.unwrap();
        assert!(rows.is_none());
    }

    #[tokio::test]
    async fn probe_fails_when_dir_disappears() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("feeds");
        std::fs::create_dir(&dir).unwrap();
        let fetcher: FileFetcher<LegRow> = FileFetcher::new("leg", &dir);

        let mut handle = fetcher.connect().await.unwrap();
        fetcher.login(&mut handle).await.unwrap();
        std::fs::remove_dir(&dir).unwrap();

        let err = fetcher.probe(&handle).await.unwrap_err();
        assert!(err.is_connection());
        assert!(fetcher.connect().await.is_err());
    }

    #[tokio::test]
    async fn probe_requires_login() {
        let tmp = TempDir::new().unwrap();
        let fetcher: FileFetcher<LegRow> = FileFetcher::new("leg", tmp.path());
        let handle = fetcher.connect().await.unwrap();
        assert!(fetcher.probe(&handle).await.is_err());
    }
}

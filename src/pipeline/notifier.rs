// src/pipeline/notifier.rs

//! Hash-based change detection around a content generator.
//!
//! A [`StatusMonitor`] turns data into lines; [`ChangeDetectionNotifier`]
//! digests those lines and only sends when the digest differs from the
//! last one that was delivered. The stored digest moves forward only after
//! the sink accepted the send, so a failed delivery is retried verbatim on
//! the next cycle.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::NotificationState;
use crate::services::{Notification, Notifier};
use crate::storage::StateStore;
use crate::utils::content_digest;

/// Content generator for one monitor kind.
pub trait StatusMonitor: Send + Sync {
    type Data: Send + Sync;

    /// Key under which the last delivered state is stored.
    fn kind(&self) -> &str;

    fn subject(&self, data: &Self::Data) -> String;

    /// Notification lines. An empty vector means there is nothing to say.
    fn generate_content(&self, data: &Self::Data) -> Vec<String>;

    /// Extras stored next to the digest.
    fn metadata(&self, _data: &Self::Data, content: &[String]) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("line_count".into(), Value::from(content.len()));
        metadata
    }

    fn digest(&self, content: &[String]) -> String {
        content_digest(content)
    }
}

/// Result of one change-detection cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No data to work from
    NoData,
    /// Data present but nothing to report
    Empty,
    /// Same digest as the last delivered content
    Unchanged { digest: String },
    /// New content delivered and recorded
    Sent { digest: String, lines: usize },
    /// New content could not be delivered; state left untouched
    SendFailed { digest: String },
}

impl CycleOutcome {
    /// Everything except a failed send counts as success.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::SendFailed { .. })
    }
}

/// Drives a [`StatusMonitor`] against a sink and a state store.
pub struct ChangeDetectionNotifier<M> {
    monitor: M,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn Notifier>,
    subject_prefix: String,
}

impl<M: StatusMonitor> ChangeDetectionNotifier<M> {
    pub fn new(monitor: M, store: Arc<dyn StateStore>, sink: Arc<dyn Notifier>) -> Self {
        Self {
            monitor,
            store,
            sink,
            subject_prefix: String::new(),
        }
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    /// Digest of the last delivered content, if any.
    ///
    /// An unreadable state file is treated as "never sent" so the next
    /// cycle rewrites it.
    async fn last_digest(&self) -> Option<String> {
        match self.store.load_notification_state(self.monitor.kind()).await {
            Ok(state) => state.map(|s| s.status_hash),
            Err(e) => {
                log::warn!(
                    "Unreadable {} status state, treating as unsent: {}",
                    self.monitor.kind(),
                    e
                );
                None
            }
        }
    }

    fn subject(&self, data: &M::Data) -> String {
        let subject = self.monitor.subject(data);
        if self.subject_prefix.is_empty() {
            subject
        } else {
            format!("{} {}", self.subject_prefix, subject)
        }
    }

    /// Run one cycle at `now`. Errors only come from persisting state after
    /// a successful send.
    pub async fn cycle(&self, data: Option<&M::Data>, now: NaiveDateTime) -> Result<CycleOutcome> {
        let kind = self.monitor.kind();
        let Some(data) = data else {
            log::warn!("No {} data this cycle", kind);
            return Ok(CycleOutcome::NoData);
        };

        let content = self.monitor.generate_content(data);
        if content.is_empty() {
            log::debug!("{} monitor produced no content", kind);
            return Ok(CycleOutcome::Empty);
        }

        let digest = self.monitor.digest(&content);
        if self.last_digest().await.as_deref() == Some(digest.as_str()) {
            log::debug!("{} content unchanged", kind);
            return Ok(CycleOutcome::Unchanged { digest });
        }

        let notification = Notification::new(self.subject(data), content);
        if let Err(e) = self.sink.send(&notification).await {
            log::error!("Failed to deliver {} notification: {}", kind, e);
            return Ok(CycleOutcome::SendFailed { digest });
        }

        let metadata = self.monitor.metadata(data, &notification.lines);
        let state = NotificationState::new(digest.clone(), metadata, now);
        self.store.save_notification_state(kind, &state).await?;

        log::info!(
            "Sent {} notification via {} ({} lines)",
            kind,
            self.sink.channel(),
            notification.lines.len()
        );
        Ok(CycleOutcome::Sent {
            digest,
            lines: notification.lines.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Sink that records deliveries and can be told to fail.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub sent: Mutex<Vec<Notification>>,
        pub fail: AtomicBool,
    }

    impl RecordingSink {
        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingSink {
        fn channel(&self) -> &str {
            "recording"
        }

        async fn send(&self, notification: &Notification) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::notification("recording", "refused"));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Echo;

    impl StatusMonitor for Echo {
        type Data = Vec<String>;

        fn kind(&self) -> &str {
            "echo"
        }

        fn subject(&self, _data: &Vec<String>) -> String {
            "echo".into()
        }

        fn generate_content(&self, data: &Vec<String>) -> Vec<String> {
            data.clone()
        }
    }

    fn setup(tmp: &TempDir) -> (ChangeDetectionNotifier<Echo>, Arc<RecordingSink>, Arc<LocalStorage>) {
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(LocalStorage::new(tmp.path()));
        let notifier = ChangeDetectionNotifier::new(Echo, store.clone(), sink.clone());
        (notifier, sink, store)
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn unchanged_content_is_sent_once() {
        let tmp = TempDir::new().unwrap();
        let (notifier, sink, _) = setup(&tmp);
        let data = lines(&["B-652G停靠河内；计划执行VJ107。"]);

        assert!(matches!(notifier.cycle(Some(&data), now()).await.unwrap(), CycleOutcome::Sent { .. }));
        assert!(matches!(
            notifier.cycle(Some(&data), now()).await.unwrap(),
            CycleOutcome::Unchanged { .. }
        ));
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn reverting_content_is_sent_again() {
        let tmp = TempDir::new().unwrap();
        let (notifier, sink, _) = setup(&tmp);
        let a = lines(&["a"]);
        let b = lines(&["b"]);

        for data in [&a, &b, &a] {
            notifier.cycle(Some(data), now()).await.unwrap();
        }
        assert_eq!(sink.count(), 3);
    }

    #[tokio::test]
    async fn failed_send_keeps_previous_digest() {
        let tmp = TempDir::new().unwrap();
        let (notifier, sink, store) = setup(&tmp);

        notifier.cycle(Some(&lines(&["a"])), now()).await.unwrap();
        let before = store.load_notification_state("echo").await.unwrap().unwrap();

        sink.fail.store(true, Ordering::SeqCst);
        let outcome = notifier.cycle(Some(&lines(&["b"])), now()).await.unwrap();
        assert!(!outcome.is_success());
        let after = store.load_notification_state("echo").await.unwrap().unwrap();
        assert_eq!(before.status_hash, after.status_hash);

        // Retried verbatim once the sink recovers
        sink.fail.store(false, Ordering::SeqCst);
        let outcome = notifier.cycle(Some(&lines(&["b"])), now()).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Sent { .. }));
        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn no_data_and_empty_content_do_not_send() {
        let tmp = TempDir::new().unwrap();
        let (notifier, sink, store) = setup(&tmp);

        assert_eq!(notifier.cycle(None, now()).await.unwrap(), CycleOutcome::NoData);
        assert_eq!(notifier.cycle(Some(&Vec::new()), now()).await.unwrap(), CycleOutcome::Empty);
        assert_eq!(sink.count(), 0);
        assert!(store.load_notification_state("echo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_state_carries_metadata() {
        let tmp = TempDir::new().unwrap();
        let (notifier, _, store) = setup(&tmp);
        notifier.cycle(Some(&lines(&["a", "b"])), now()).await.unwrap();

        let state = store.load_notification_state("echo").await.unwrap().unwrap();
        assert_eq!(state.metadata["line_count"], 2);
        assert_eq!(state.status_hash, content_digest(&lines(&["a", "b"])));
        assert_eq!(state.timestamp, now());
        assert_eq!(state.date, now().date());
    }
}

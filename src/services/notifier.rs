// src/services/notifier.rs

//! Notification sinks.
//!
//! A [`Notifier`] delivers a rendered block of lines. Formatting belongs to
//! the status monitors; transport belongs here.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::NotifyConfig;
use crate::utils::log;

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub lines: Vec<String>,
}

impl Notification {
    pub fn new(subject: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            lines,
        }
    }

    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

/// Delivery channel for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logs and errors.
    fn channel(&self) -> &str;

    /// Deliver one notification. An `Err` means it was not delivered.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn channel(&self) -> &str {
        "console"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        log::block(&notification.subject, &notification.lines);
        Ok(())
    }
}

/// POSTs notifications as JSON to a webhook.
#[cfg(feature = "webhook")]
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: url::Url,
}

#[cfg(feature = "webhook")]
#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    text: String,
    lines: &'a [String],
}

#[cfg(feature = "webhook")]
impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: &str) -> Result<Self> {
        Ok(Self {
            client,
            url: url::Url::parse(url)?,
        })
    }
}

#[cfg(feature = "webhook")]
#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = WebhookPayload {
            subject: &notification.subject,
            text: notification.body(),
            lines: &notification.lines,
        };
        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::notification(self.channel(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::notification(
                self.channel(),
                format!("{} returned {}", self.url, status),
            ));
        }
        ::log::debug!("Webhook accepted '{}' ({})", notification.subject, status);
        Ok(())
    }
}

/// Pick the sink the config asks for.
pub fn from_config(config: &NotifyConfig) -> Result<Box<dyn Notifier>> {
    match &config.webhook_url {
        #[cfg(feature = "webhook")]
        Some(url) => {
            let client = crate::utils::http::create_async_client(config)?;
            Ok(Box::new(WebhookNotifier::new(client, url)?))
        }
        #[cfg(not(feature = "webhook"))]
        Some(_) => Err(AppError::config(
            "notify.webhook_url is set but the webhook feature is disabled",
        )),
        None => Ok(Box::new(ConsoleNotifier)),
    }
}

// src/error.rs

//! Unified error handling for the fleet monitor.

use std::fmt;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[cfg(feature = "webhook")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[cfg(feature = "webhook")]
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connect, login or liveness probe failed
    #[error("Connection error for {context}: {message}")]
    Connection { context: String, message: String },

    /// A feed returned nothing usable
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Flight number absent from the static schedule
    #[error("Flight {0} is not in the schedule")]
    ScheduleLookupMiss(String),

    /// Notifier refused or failed to deliver
    #[error("Notification send failed via {channel}: {message}")]
    NotificationSend { channel: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a connection error with context.
    pub fn connection(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Connection {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a data-unavailable error.
    pub fn data_unavailable(message: impl Into<String>) -> Self {
        Self::DataUnavailable(message.into())
    }

    /// Create a notification send error.
    pub fn notification(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::NotificationSend {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error came from the connection layer and is worth a reconnect.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

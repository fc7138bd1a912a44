use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for the flare collector.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (non-2xx or unreadable body).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A date or date range could not be interpreted.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The durable queue could not be reached or used.
    #[error("Queue error: {0}")]
    QueueError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

}

impl AppError {
    /// Returns true if this error comes from talking to the upstream API.
    ///
    /// The source client folds these into an empty result instead of
    /// propagating them.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_)
                | AppError::Timeout(_)
                | AppError::NetworkError(_)
                | AppError::SerializationError(_)
        )
    }

    /// Returns true if this error should stop a long-running consumer.
    pub fn is_fatal_to_listener(&self) -> bool {
        matches!(self, AppError::QueueError(_))
    }
}

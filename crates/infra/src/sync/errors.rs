//! Dispatch-specific error types
//!
//! Classifies outbox delivery failures with retry metadata.

use calsync_domain::CalSyncError;
use thiserror::Error;

/// Categories of dispatch errors for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchErrorCategory {
    /// Authentication errors (401, 403) - retry after the service token rotates
    Authentication,
    /// Rate limiting errors (429) - retry with backoff
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// Configuration errors - non-retryable
    Config,
}

/// Outbox delivery errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DispatchError {
    /// Classify a non-success HTTP response from the consumer.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}: {body}");
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimit(message),
            500..=599 => Self::Server(message),
            _ => Self::Client(message),
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> DispatchErrorCategory {
        match self {
            Self::Auth(_) => DispatchErrorCategory::Authentication,
            Self::RateLimit(_) => DispatchErrorCategory::RateLimit,
            Self::Server(_) => DispatchErrorCategory::Server,
            Self::Client(_) => DispatchErrorCategory::Client,
            Self::Network(_) => DispatchErrorCategory::Network,
            Self::Config(_) => DispatchErrorCategory::Config,
        }
    }

    /// Check if this error should be retried
    pub fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            DispatchErrorCategory::Authentication
                | DispatchErrorCategory::RateLimit
                | DispatchErrorCategory::Server
                | DispatchErrorCategory::Network
        )
    }
}

impl From<CalSyncError> for DispatchError {
    fn from(err: CalSyncError) -> Self {
        match err {
            CalSyncError::Network(message) => Self::Network(message),
            CalSyncError::Config(message) => Self::Config(message),
            CalSyncError::Unauthorized(message) | CalSyncError::Forbidden(message) => {
                Self::Auth(message)
            }
            CalSyncError::UpstreamProvider { status, body } => Self::from_status(status, &body),
            CalSyncError::BadRequest(message) | CalSyncError::NotFound(message) => {
                Self::Client(message)
            }
            other => Self::Server(other.to_string()),
        }
    }
}

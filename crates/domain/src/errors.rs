//! Error types used throughout the sync engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for calendar synchronization.
///
/// Every fatal step of a sync invocation resolves to exactly one of these
/// variants. The HTTP layer renders them as structured JSON bodies using
/// [`CalSyncError::code`] and [`CalSyncError::http_status`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalSyncError {
    /// Malformed manual-sync body or request shape.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or rejected bearer token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated caller is not allowed to sync the target connection.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No refresh token stored; the user has to reconnect the calendar.
    #[error("Credentials exhausted: {0}")]
    CredentialsExhausted(String),

    /// Provider rejected the refresh grant.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Provider answered 410 Gone for the stored sync cursor.
    #[error("Sync token invalid: {0}")]
    SyncTokenInvalid(String),

    /// Any other non-2xx answer from the provider.
    #[error("Upstream provider error ({status}): {body}")]
    UpstreamProvider { status: u16, body: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CalSyncError {
    /// Stable machine-readable code used in error bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::CredentialsExhausted(_) => "credentials_exhausted",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::SyncTokenInvalid(_) => "sync_token_invalid",
            Self::UpstreamProvider { .. } => "upstream_provider_error",
            Self::Database(_) => "database",
            Self::Network(_) => "network",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status the API layer answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            // Surfaced to the UI as "reconnect required".
            Self::CredentialsExhausted(_) => 409,
            Self::RefreshFailed(_) => 502,
            // 503 lets the provider / platform redeliver; the cursor is
            // already cleared so the retry runs a full sync.
            Self::SyncTokenInvalid(_) => 503,
            Self::UpstreamProvider { .. } => 502,
            Self::Network(_) => 503,
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Whether a caller may reasonably retry the same invocation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RefreshFailed(_)
                | Self::SyncTokenInvalid(_)
                | Self::Network(_)
                | Self::Database(_)
        )
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, CalSyncError>;

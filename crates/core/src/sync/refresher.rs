//! Credential refresher
//!
//! Treats an access token as unusable once it is within the safety buffer of
//! its expiry, and exchanges the refresh token before any provider call.

use std::sync::Arc;

use calsync_domain::{CalSyncError, CalendarConnection, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use super::ports::{CalendarApi, ConnectionRepository, ProviderError};

/// Whether a token expiring at `expires_at` must be refreshed at `now`.
///
/// Unknown expiry is treated as expired.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>, buffer: Duration) -> bool {
    match expires_at {
        Some(expires_at) => expires_at - now <= buffer,
        None => true,
    }
}

pub struct CredentialRefresher {
    api: Arc<dyn CalendarApi>,
    connections: Arc<dyn ConnectionRepository>,
    buffer: Duration,
}

impl CredentialRefresher {
    pub fn new(
        api: Arc<dyn CalendarApi>,
        connections: Arc<dyn ConnectionRepository>,
        buffer: Duration,
    ) -> Self {
        Self { api, connections, buffer }
    }

    /// Return the connection with a usable access token, refreshing and
    /// persisting a new one if needed.
    #[instrument(skip_all, fields(connection_id = %connection.id))]
    pub async fn ensure_fresh(&self, mut connection: CalendarConnection) -> Result<CalendarConnection> {
        let now = Utc::now();
        if !needs_refresh(connection.token_expires_at, now, self.buffer) {
            debug!("access token still valid");
            return Ok(connection);
        }

        let refresh_token = match connection.refresh_token.as_deref() {
            Some(token) if !token.trim().is_empty() => token.to_string(),
            _ => {
                warn!("access token expired and no refresh token is stored");
                return Err(CalSyncError::CredentialsExhausted(
                    "no refresh token; calendar must be reconnected".into(),
                ));
            }
        };

        let grant = self.api.refresh_access_token(&refresh_token).await.map_err(|err| {
            warn!(error = %err, "token refresh failed");
            match err {
                ProviderError::Transport(msg) => CalSyncError::Network(msg),
                other => CalSyncError::RefreshFailed(other.to_string()),
            }
        })?;

        let expires_at = grant.expires_at(Utc::now()).ok_or_else(|| {
            warn!(expires_in = grant.expires_in, "token grant lifetime out of range");
            CalSyncError::RefreshFailed(format!(
                "token endpoint returned unusable expires_in {}",
                grant.expires_in
            ))
        })?;
        self.connections.update_credentials(&connection.id, &grant.access_token, expires_at).await?;

        info!(%expires_at, "access token refreshed");
        connection.access_token = grant.access_token;
        connection.token_expires_at = Some(expires_at);
        Ok(connection)
    }
}

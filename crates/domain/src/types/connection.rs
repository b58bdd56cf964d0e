//! Calendar connection: credentials, webhook identity and sync cursor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's link to an external calendar.
///
/// Created when the user completes OAuth (outside this engine). The sync
/// engine only mutates the credential fields and the cursor.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConnection {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Watch channel id assigned when the push subscription was registered.
    pub channel_id: Option<String>,
    /// Provider resource id of the watched calendar.
    pub resource_id: Option<String>,
    /// Shared secret echoed back by the provider on every push.
    pub channel_token: Option<String>,
    /// Incremental-sync cursor. `None` means a full resync is required.
    pub sync_token: Option<String>,
    /// Bumped on every cursor write; used for compare-and-swap updates.
    pub sync_token_version: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarConnection {
    /// Whether the connection is reachable by a push for this channel pair.
    pub fn matches_channel(&self, channel_id: &str, resource_id: &str) -> bool {
        self.channel_id.as_deref() == Some(channel_id)
            && self.resource_id.as_deref() == Some(resource_id)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|token| !token.trim().is_empty())
    }
}

// Tokens never reach logs.
impl fmt::Debug for CalendarConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_expires_at", &self.token_expires_at)
            .field("channel_id", &self.channel_id)
            .field("resource_id", &self.resource_id)
            .field("channel_token", &self.channel_token.as_ref().map(|_| "<redacted>"))
            .field("sync_token", &self.sync_token.as_ref().map(|_| "<present>"))
            .field("sync_token_version", &self.sync_token_version)
            .field("last_synced_at", &self.last_synced_at)
            .finish_non_exhaustive()
    }
}

/// Fields required to register a new connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCalendarConnection {
    pub user_id: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for NewCalendarConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCalendarConnection")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("token_expires_at", &self.token_expires_at)
            .finish_non_exhaustive()
    }
}

/// Identity of a caller verified by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub id: String,
    pub email: Option<String>,
}

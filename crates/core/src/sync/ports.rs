//! Port interfaces for sync operations

use async_trait::async_trait;
use calsync_domain::{
    CalendarConnection, CalendarEventRow, DomainEvent, EventsPage, EventsQuery, NewCalendarEvent,
    Result, TokenGrant, VerifiedUser,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Persisted calendar connections (credentials, webhook identity, cursor).
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<CalendarConnection>>;

    /// Resolve a push notification's channel pair to its connection.
    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<CalendarConnection>>;

    /// Persist a freshly exchanged access token and its expiry.
    async fn update_credentials(
        &self,
        id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Compare-and-swap cursor write.
    ///
    /// Returns `false` when `expected_version` no longer matches, i.e. another
    /// invocation advanced the cursor first.
    async fn update_sync_token(
        &self,
        id: &str,
        sync_token: &str,
        expected_version: i64,
    ) -> Result<bool>;

    /// Unconditionally drop the cursor so the next run performs a full sync.
    async fn clear_sync_token(&self, id: &str) -> Result<()>;
}

/// Local mirror of provider events.
#[async_trait]
pub trait CalendarEventRepository: Send + Sync {
    /// Upsert keyed on `(calendar_connection_id, external_id)`; returns the stored rows.
    async fn upsert_events(&self, events: &[NewCalendarEvent]) -> Result<Vec<CalendarEventRow>>;

    /// Delete rows whose external id is in `external_ids`; returns the rows removed.
    ///
    /// Absent ids are not an error.
    async fn delete_by_external_ids(
        &self,
        connection_id: &str,
        external_ids: &[String],
    ) -> Result<Vec<CalendarEventRow>>;

    async fn list_for_connection(&self, connection_id: &str) -> Result<Vec<CalendarEventRow>>;
}

/// Trait for managing outbox queue operations
#[async_trait]
pub trait OutboxQueue: Send + Sync {
    /// Insert a batch of domain events atomically
    async fn enqueue_batch(&self, events: &[DomainEvent]) -> Result<()>;

    /// Pending events whose retry time has passed, oldest first
    async fn dequeue_batch(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<DomainEvent>>;

    /// Mark an event as delivered
    async fn mark_sent(&self, id: &str) -> Result<()>;

    /// Record a failed attempt.
    ///
    /// `retry_at` of `None` parks the event as permanently failed.
    async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Failures reported by the calendar provider adapter.
///
/// Kept separate from `CalSyncError` so the fetch loop can react to `Gone`
/// before mapping to the invocation-level taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// 410: the sync cursor is no longer valid.
    #[error("sync token rejected by provider: {0}")]
    Gone(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The token endpoint refused the refresh grant.
    #[error("refresh grant rejected: {0}")]
    GrantRejected(String),

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

/// Calendar provider API (events list + OAuth token endpoint).
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(
        &self,
        access_token: &str,
        query: &EventsQuery,
    ) -> std::result::Result<EventsPage, ProviderError>;

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<TokenGrant, ProviderError>;
}

/// Verifies a manual-sync bearer token with the identity provider.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Returns `CalSyncError::Unauthorized` for rejected tokens.
    async fn verify(&self, bearer_token: &str) -> Result<VerifiedUser>;
}

/// Authenticates a push notification against the connection it resolved to.
pub trait WebhookVerifier: Send + Sync {
    fn verify(&self, connection: &CalendarConnection, channel_token: Option<&str>) -> bool;

    fn name(&self) -> &'static str;
}

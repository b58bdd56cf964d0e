//! Sync engine constants
//!
//! Centralized location for protocol header names, defaults, and outbox
//! identifiers shared by every layer.

// Provider push-notification headers (lowercase, as normalised by the HTTP layer)
pub const HEADER_RESOURCE_STATE: &str = "x-goog-resource-state";
pub const HEADER_CHANNEL_ID: &str = "x-goog-channel-id";
pub const HEADER_RESOURCE_ID: &str = "x-goog-resource-id";
pub const HEADER_CHANNEL_TOKEN: &str = "x-goog-channel-token";
pub const HEADER_AUTHORIZATION: &str = "authorization";

/// Resource state sent by the provider when a watch channel is first created.
pub const RESOURCE_STATE_SYNC: &str = "sync";

// Credential lifetime
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;

// Fetch window for full syncs ("one month back")
pub const DEFAULT_FULL_SYNC_LOOKBACK_DAYS: i64 = 30;
pub const DEFAULT_CALENDAR_ID: &str = "primary";

// Provider event status that marks a deletion
pub const PROVIDER_STATUS_CANCELLED: &str = "cancelled";

// Outbox
pub const EVENT_SOURCE: &str = "calendar-sync";
pub const EVENT_TYPE_SYNCED: &str = "calendar.event.synced";
pub const EVENT_TYPE_DELETED: &str = "calendar.event.deleted";
pub const DEFAULT_OUTBOX_BATCH_SIZE: usize = 50;
pub const DEFAULT_OUTBOX_POLL_SECS: u64 = 10;
pub const DEFAULT_OUTBOX_MAX_ATTEMPTS: i64 = 5;

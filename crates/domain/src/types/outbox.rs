//! Outbox records for downstream consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{EVENT_SOURCE, EVENT_TYPE_DELETED, EVENT_TYPE_SYNCED};

/// Kind of change announced to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEventType {
    #[serde(rename = "calendar.event.synced")]
    EventSynced,
    #[serde(rename = "calendar.event.deleted")]
    EventDeleted,
}

crate::impl_domain_status_conversions!(DomainEventType {
    EventSynced => EVENT_TYPE_SYNCED,
    EventDeleted => EVENT_TYPE_DELETED,
});

/// Delivery state of an outbox row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

crate::impl_domain_status_conversions!(OutboxStatus {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
});

/// One row of the `domain_events` outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: DomainEventType,
    pub source: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl DomainEvent {
    /// Build a pending event tagged with the sync engine's source.
    pub fn new(
        user_id: impl Into<String>,
        event_type: DomainEventType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            event_type,
            source: EVENT_SOURCE.to_string(),
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

//! Event publisher
//!
//! Turns reconciliation results into outbox rows. Publishing is best-effort:
//! the mirror is already durable, so failures are logged and swallowed.

use std::sync::Arc;

use calsync_domain::{CalendarEventRow, DomainEvent, DomainEventType};
use serde_json::json;
use tracing::{debug, error, instrument};

use super::ports::OutboxQueue;
use super::reconciler::ReconcileOutcome;

fn synced_payload(row: &CalendarEventRow) -> serde_json::Value {
    json!({
        "calendar_connection_id": row.calendar_connection_id,
        "event_id": row.id,
        "external_id": row.external_id,
        "title": row.title,
        "start_time": row.start_time.to_storage_string(),
        "end_time": row.end_time.to_storage_string(),
        "is_all_day": row.is_all_day,
    })
}

fn deleted_payload(row: &CalendarEventRow) -> serde_json::Value {
    json!({
        "calendar_connection_id": row.calendar_connection_id,
        "event_id": row.id,
        "external_id": row.external_id,
    })
}

/// One domain event per affected row: synced for upserts, deleted for deletions.
pub fn build_events(user_id: &str, outcome: &ReconcileOutcome) -> Vec<DomainEvent> {
    let synced = outcome
        .upserted
        .iter()
        .map(|row| DomainEvent::new(user_id, DomainEventType::EventSynced, synced_payload(row)));
    let deleted = outcome
        .deleted
        .iter()
        .map(|row| DomainEvent::new(user_id, DomainEventType::EventDeleted, deleted_payload(row)));
    synced.chain(deleted).collect()
}

pub struct EventPublisher {
    outbox: Arc<dyn OutboxQueue>,
}

impl EventPublisher {
    pub fn new(outbox: Arc<dyn OutboxQueue>) -> Self {
        Self { outbox }
    }

    /// Enqueue events for `outcome`; returns how many were written.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn publish(&self, user_id: &str, outcome: &ReconcileOutcome) -> usize {
        let events = build_events(user_id, outcome);
        if events.is_empty() {
            return 0;
        }

        match self.outbox.enqueue_batch(&events).await {
            Ok(()) => {
                debug!(count = events.len(), "domain events enqueued");
                events.len()
            }
            Err(err) => {
                error!(error = %err, count = events.len(), "failed to publish domain events");
                0
            }
        }
    }
}

//! Reconciler
//!
//! Makes the local mirror match what the provider reported: cancelled items
//! are deleted, everything else is upserted on `(connection, external_id)`,
//! and the cursor advances only when the provider issued a new one.

use std::collections::HashMap;
use std::sync::Arc;

use calsync_domain::{
    CalendarConnection, CalendarEventRow, EventTime, NewCalendarEvent, ProviderEvent,
    ProviderEventTime, Result,
};
use tracing::{debug, info, instrument, warn};

use super::fetch::FetchOutcome;
use super::ports::{CalendarEventRepository, ConnectionRepository};

const UNTITLED_EVENT: &str = "Untitled Event";

/// Rows touched by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub upserted: Vec<CalendarEventRow>,
    pub deleted: Vec<CalendarEventRow>,
    /// Items dropped because they lacked an id or a start time.
    pub skipped: usize,
    /// Whether the connection's cursor was replaced.
    pub cursor_advanced: bool,
}

/// Items split by provider status.
#[derive(Debug, Default, PartialEq)]
pub struct Partition {
    pub active: Vec<NewCalendarEvent>,
    pub cancelled_ids: Vec<String>,
    pub skipped: usize,
}

/// Split provider items into upserts and deletions.
///
/// When an id appears more than once, its last occurrence decides.
pub fn partition(connection_id: &str, items: Vec<ProviderEvent>) -> Partition {
    let mut latest: Vec<(String, ProviderEvent)> = Vec::with_capacity(items.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0;

    for item in items {
        let Some(id) = item.id.clone().filter(|id| !id.is_empty()) else {
            warn!("skipping provider item without id");
            skipped += 1;
            continue;
        };
        match index.get(&id) {
            Some(&slot) => latest[slot].1 = item,
            None => {
                index.insert(id.clone(), latest.len());
                latest.push((id, item));
            }
        }
    }

    let mut partition = Partition { skipped, ..Partition::default() };
    for (id, item) in latest {
        if item.is_cancelled() {
            partition.cancelled_ids.push(id);
            continue;
        }
        match to_new_event(connection_id, &id, item) {
            Some(event) => partition.active.push(event),
            None => {
                warn!(external_id = %id, "skipping provider item without a usable start time");
                partition.skipped += 1;
            }
        }
    }
    partition
}

/// Map an active provider item to a mirror row.
///
/// An item whose start has no time of day is all-day; its date values are
/// used for both start and end.
pub fn to_new_event(connection_id: &str, external_id: &str, item: ProviderEvent) -> Option<NewCalendarEvent> {
    let start = item.start.as_ref()?;
    let end = item.end.as_ref();

    let (start_time, end_time, is_all_day) = match start.date_time.as_deref() {
        Some(start_dt) => {
            let start_time = EventTime::parse(start_dt).ok()?;
            let end_time = end
                .and_then(|end| end.date_time.as_deref())
                .and_then(|value| EventTime::parse(value).ok())
                .unwrap_or(start_time);
            (start_time, end_time, false)
        }
        None => {
            let start_time = parse_date(start)?;
            let end_time = end.and_then(parse_date).unwrap_or(start_time);
            (start_time, end_time, true)
        }
    };

    Some(NewCalendarEvent {
        calendar_connection_id: connection_id.to_string(),
        external_id: external_id.to_string(),
        title: item
            .summary
            .clone()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_EVENT.to_string()),
        description: item.description.clone(),
        location: item.location.clone(),
        start_time,
        end_time,
        is_all_day,
        raw_data: item.raw,
    })
}

fn parse_date(time: &ProviderEventTime) -> Option<EventTime> {
    time.date
        .as_deref()
        .and_then(|value| EventTime::parse(value).ok())
        .filter(EventTime::is_date_only)
}

pub struct Reconciler {
    events: Arc<dyn CalendarEventRepository>,
    connections: Arc<dyn ConnectionRepository>,
}

impl Reconciler {
    pub fn new(
        events: Arc<dyn CalendarEventRepository>,
        connections: Arc<dyn ConnectionRepository>,
    ) -> Self {
        Self { events, connections }
    }

    #[instrument(skip_all, fields(connection_id = %connection.id))]
    pub async fn reconcile(
        &self,
        connection: &CalendarConnection,
        fetched: FetchOutcome,
    ) -> Result<ReconcileOutcome> {
        let Partition { active, cancelled_ids, skipped } = partition(&connection.id, fetched.items);

        let deleted = if cancelled_ids.is_empty() {
            Vec::new()
        } else {
            self.events.delete_by_external_ids(&connection.id, &cancelled_ids).await?
        };
        if deleted.len() < cancelled_ids.len() {
            debug!(
                cancelled = cancelled_ids.len(),
                deleted = deleted.len(),
                "some cancellations were already applied"
            );
        }

        let upserted =
            if active.is_empty() { Vec::new() } else { self.events.upsert_events(&active).await? };

        let cursor_advanced = match fetched.next_sync_token.as_deref() {
            Some(token) => {
                let swapped = self
                    .connections
                    .update_sync_token(&connection.id, token, connection.sync_token_version)
                    .await?;
                if !swapped {
                    warn!(
                        expected_version = connection.sync_token_version,
                        "cursor moved during sync; keeping the concurrent writer's token"
                    );
                }
                swapped
            }
            None => {
                debug!("provider returned no sync token; leaving existing cursor unchanged");
                false
            }
        };

        info!(
            upserted = upserted.len(),
            deleted = deleted.len(),
            skipped,
            cursor_advanced,
            "reconciliation complete"
        );
        Ok(ReconcileOutcome { upserted, deleted, skipped, cursor_advanced })
    }
}

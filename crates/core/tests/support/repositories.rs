//! In-memory repositories for connections, mirrored events, and the outbox.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::{CalendarEventRepository, ConnectionRepository, OutboxQueue};
use calsync_domain::{
    CalSyncError, CalendarConnection, CalendarEventRow, DomainEvent, NewCalendarEvent,
    OutboxStatus, Result as DomainResult,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Default, Clone)]
pub struct InMemoryConnections {
    connections: Arc<Mutex<HashMap<String, CalendarConnection>>>,
    pub credential_writes: Arc<AtomicUsize>,
}

impl InMemoryConnections {
    pub fn with(connection: CalendarConnection) -> Self {
        let repo = Self::default();
        repo.insert(connection);
        repo
    }

    pub fn insert(&self, connection: CalendarConnection) {
        self.connections.lock().insert(connection.id.clone(), connection);
    }

    pub fn get(&self, id: &str) -> CalendarConnection {
        self.connections.lock().get(id).cloned().unwrap()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnections {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<CalendarConnection>> {
        Ok(self.connections.lock().get(id).cloned())
    }

    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> DomainResult<Option<CalendarConnection>> {
        Ok(self
            .connections
            .lock()
            .values()
            .find(|conn| conn.matches_channel(channel_id, resource_id))
            .cloned())
    }

    async fn update_credentials(
        &self,
        id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut guard = self.connections.lock();
        let conn = guard.get_mut(id).ok_or_else(|| CalSyncError::NotFound(id.to_string()))?;
        conn.access_token = access_token.to_string();
        conn.token_expires_at = Some(expires_at);
        self.credential_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_sync_token(
        &self,
        id: &str,
        sync_token: &str,
        expected_version: i64,
    ) -> DomainResult<bool> {
        let mut guard = self.connections.lock();
        let conn = guard.get_mut(id).ok_or_else(|| CalSyncError::NotFound(id.to_string()))?;
        if conn.sync_token_version != expected_version {
            return Ok(false);
        }
        conn.sync_token = Some(sync_token.to_string());
        conn.sync_token_version += 1;
        conn.last_synced_at = Some(Utc::now());
        Ok(true)
    }

    async fn clear_sync_token(&self, id: &str) -> DomainResult<()> {
        let mut guard = self.connections.lock();
        let conn = guard.get_mut(id).ok_or_else(|| CalSyncError::NotFound(id.to_string()))?;
        conn.sync_token = None;
        conn.sync_token_version += 1;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryEvents {
    rows: Arc<Mutex<Vec<CalendarEventRow>>>,
    next_id: Arc<AtomicUsize>,
}

impl InMemoryEvents {
    pub fn rows(&self) -> Vec<CalendarEventRow> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl CalendarEventRepository for InMemoryEvents {
    async fn upsert_events(&self, events: &[NewCalendarEvent]) -> DomainResult<Vec<CalendarEventRow>> {
        let mut rows = self.rows.lock();
        let now = Utc::now();
        let mut stored = Vec::with_capacity(events.len());

        for event in events {
            let existing = rows.iter_mut().find(|row| {
                row.calendar_connection_id == event.calendar_connection_id
                    && row.external_id == event.external_id
            });
            let row = match existing {
                Some(row) => {
                    row.title = event.title.clone();
                    row.description = event.description.clone();
                    row.location = event.location.clone();
                    row.start_time = event.start_time;
                    row.end_time = event.end_time;
                    row.is_all_day = event.is_all_day;
                    row.raw_data = event.raw_data.clone();
                    row.updated_at = now;
                    row.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    let row = CalendarEventRow {
                        id: format!("row-{id}"),
                        calendar_connection_id: event.calendar_connection_id.clone(),
                        external_id: event.external_id.clone(),
                        title: event.title.clone(),
                        description: event.description.clone(),
                        location: event.location.clone(),
                        start_time: event.start_time,
                        end_time: event.end_time,
                        is_all_day: event.is_all_day,
                        raw_data: event.raw_data.clone(),
                        created_at: now,
                        updated_at: now,
                    };
                    rows.push(row.clone());
                    row
                }
            };
            stored.push(row);
        }
        Ok(stored)
    }

    async fn delete_by_external_ids(
        &self,
        connection_id: &str,
        external_ids: &[String],
    ) -> DomainResult<Vec<CalendarEventRow>> {
        let mut rows = self.rows.lock();
        let (removed, kept): (Vec<_>, Vec<_>) = rows.drain(..).partition(|row| {
            row.calendar_connection_id == connection_id && external_ids.contains(&row.external_id)
        });
        *rows = kept;
        Ok(removed)
    }

    async fn list_for_connection(&self, connection_id: &str) -> DomainResult<Vec<CalendarEventRow>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|row| row.calendar_connection_id == connection_id)
            .cloned()
            .collect())
    }
}

/// Outbox that records enqueued events, or fails every write.
#[derive(Default, Clone)]
pub struct RecordingOutbox {
    events: Arc<Mutex<Vec<DomainEvent>>>,
    failing: bool,
}

impl RecordingOutbox {
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl OutboxQueue for RecordingOutbox {
    async fn enqueue_batch(&self, events: &[DomainEvent]) -> DomainResult<()> {
        if self.failing {
            return Err(CalSyncError::Database("outbox unavailable".into()));
        }
        self.events.lock().extend_from_slice(events);
        Ok(())
    }

    async fn dequeue_batch(&self, limit: usize, _now: DateTime<Utc>) -> DomainResult<Vec<DomainEvent>> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|event| event.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: &str) -> DomainResult<()> {
        if let Some(event) = self.events.lock().iter_mut().find(|event| event.id == id) {
            event.status = OutboxStatus::Sent;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        _retry_at: Option<DateTime<Utc>>,
    ) -> DomainResult<()> {
        if let Some(event) = self.events.lock().iter_mut().find(|event| event.id == id) {
            event.attempts += 1;
            event.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

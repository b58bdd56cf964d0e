//! SQLite-backed implementation of the outbox queue port.
//!
//! Rows live in `domain_events`. A failed delivery either schedules a retry
//! through `next_attempt_at` or parks the row as `failed`.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::OutboxQueue as OutboxQueuePort;
use calsync_domain::{
    CalSyncError, DomainEvent, DomainEventType, OutboxStatus, Result as DomainResult,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument, warn};

use super::manager::{
    from_millis, from_millis_opt, map_sql_error, to_millis, with_connection, DbManager,
};

pub struct SqliteOutboxRepository {
    db: Arc<DbManager>,
}

impl SqliteOutboxRepository {
    /// Construct a repository backed by the shared manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> DomainResult<Option<DomainEvent>> {
        let id = id.to_string();
        with_connection(&self.db, move |conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM domain_events WHERE id = ?1"),
                params![id],
                map_outbox_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
    }

    /// Number of rows in `status`.
    pub async fn count_by_status(&self, status: OutboxStatus) -> DomainResult<i64> {
        with_connection(&self.db, move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM domain_events WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .map_err(map_sql_error)
        })
        .await
    }
}

const SELECT_COLUMNS: &str = "id, user_id, event_type, source, payload, status, attempts,
        last_error, next_attempt_at, created_at, processed_at";

const OUTBOX_INSERT_SQL: &str = "INSERT INTO domain_events (
        id, user_id, event_type, source, payload, status, attempts, last_error,
        next_attempt_at, created_at, processed_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const OUTBOX_DEQUEUE_SQL: &str = "SELECT
        id, user_id, event_type, source, payload, status, attempts,
        last_error, next_attempt_at, created_at, processed_at
    FROM domain_events
    WHERE status = 'pending'
      AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
    ORDER BY created_at ASC, id ASC
    LIMIT ?2";

fn map_outbox_row(row: &Row<'_>) -> rusqlite::Result<DomainEvent> {
    let id: String = row.get(0)?;
    let event_type_raw: String = row.get(2)?;
    let event_type = event_type_raw.parse::<DomainEventType>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, err.into())
    })?;
    let payload_raw: String = row.get(4)?;
    let payload = serde_json::from_str(&payload_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let status_raw: String = row.get(5)?;
    let status = parse_status(&id, &status_raw);

    Ok(DomainEvent {
        id,
        user_id: row.get(1)?,
        event_type,
        source: row.get(3)?,
        payload,
        status,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        next_attempt_at: from_millis_opt(row.get(8)?)?,
        created_at: from_millis(row.get(9)?)?,
        processed_at: from_millis_opt(row.get(10)?)?,
    })
}

fn parse_status(id: &str, raw: &str) -> OutboxStatus {
    match raw.parse::<OutboxStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(
                event_id = %id,
                raw_status = %raw,
                error = %err,
                "invalid outbox status in database, defaulting to pending"
            );
            OutboxStatus::Pending
        }
    }
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl OutboxQueuePort for SqliteOutboxRepository {
    #[instrument(skip_all, fields(count = events.len()))]
    async fn enqueue_batch(&self, events: &[DomainEvent]) -> DomainResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let events = events.to_vec();

        with_connection(&self.db, move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            {
                let mut stmt = tx.prepare_cached(OUTBOX_INSERT_SQL).map_err(map_sql_error)?;
                for event in &events {
                    let payload = serde_json::to_string(&event.payload).map_err(|e| {
                        CalSyncError::Internal(format!("failed to serialize event payload: {e}"))
                    })?;
                    stmt.execute(params![
                        event.id,
                        event.user_id,
                        event.event_type.as_str(),
                        event.source,
                        payload,
                        event.status.as_str(),
                        event.attempts,
                        event.last_error,
                        event.next_attempt_at.map(to_millis),
                        to_millis(event.created_at),
                        event.processed_at.map(to_millis),
                    ])
                    .map_err(map_sql_error)?;
                }
            }
            tx.commit().map_err(map_sql_error)?;
            debug!(count = events.len(), "domain events written to outbox");
            Ok(())
        })
        .await
    }

    async fn dequeue_batch(&self, limit: usize, now: DateTime<Utc>) -> DomainResult<Vec<DomainEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        with_connection(&self.db, move |conn| {
            let mut stmt = conn.prepare(OUTBOX_DEQUEUE_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![to_millis(now), usize_to_i64(limit)], map_outbox_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
    }

    async fn mark_sent(&self, id: &str) -> DomainResult<()> {
        let id = id.to_string();

        with_connection(&self.db, move |conn| {
            let updated = conn
                .execute(
                    "UPDATE domain_events
                     SET status = 'sent', processed_at = ?1, next_attempt_at = NULL
                     WHERE id = ?2",
                    params![to_millis(Utc::now()), id],
                )
                .map_err(map_sql_error)?;
            if updated == 0 {
                return Err(CalSyncError::NotFound(format!("outbox event {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> DomainResult<()> {
        let id = id.to_string();
        let error = error.to_string();

        with_connection(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            let updated = match retry_at {
                Some(retry_at) => conn.execute(
                    "UPDATE domain_events
                     SET attempts = attempts + 1, last_error = ?1, next_attempt_at = ?2
                     WHERE id = ?3",
                    params![error, to_millis(retry_at), id],
                ),
                None => conn.execute(
                    "UPDATE domain_events
                     SET status = 'failed', attempts = attempts + 1, last_error = ?1,
                         next_attempt_at = NULL, processed_at = ?2
                     WHERE id = ?3",
                    params![error, now, id],
                ),
            }
            .map_err(map_sql_error)?;

            if updated == 0 {
                return Err(CalSyncError::NotFound(format!("outbox event {id}")));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    async fn setup_repository() -> (SqliteOutboxRepository, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 2).expect("manager created");
        manager.run_migrations().expect("migrations applied");
        (SqliteOutboxRepository::new(Arc::new(manager)), temp_dir)
    }

    fn sample_event(external_id: &str) -> DomainEvent {
        DomainEvent::new(
            "user-123",
            DomainEventType::EventSynced,
            json!({ "external_id": external_id }),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_and_dequeue_pending_events() {
        let (repo, _temp_dir) = setup_repository().await;
        let events = vec![sample_event("a"), sample_event("b")];

        repo.enqueue_batch(&events).await.expect("enqueue succeeds");

        let pending = repo.dequeue_batch(10, Utc::now()).await.expect("dequeue succeeds");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, events[0].id);
        assert_eq!(pending[0].event_type, DomainEventType::EventSynced);
        assert_eq!(pending[1].payload["external_id"], "b");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dequeue_with_zero_limit_returns_empty() {
        let (repo, _temp_dir) = setup_repository().await;
        repo.enqueue_batch(&[sample_event("a")]).await.unwrap();

        assert!(repo.dequeue_batch(0, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduled_retry_hides_event_until_due() {
        let (repo, _temp_dir) = setup_repository().await;
        let event = sample_event("a");
        repo.enqueue_batch(std::slice::from_ref(&event)).await.unwrap();

        let retry_at = Utc::now() + Duration::minutes(5);
        repo.mark_failed(&event.id, "503 from consumer", Some(retry_at)).await.unwrap();

        assert!(repo.dequeue_batch(10, Utc::now()).await.unwrap().is_empty());
        let due = repo.dequeue_batch(10, retry_at + Duration::seconds(1)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
        assert_eq!(due[0].last_error.as_deref(), Some("503 from consumer"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sent_and_failed_events_leave_the_queue() {
        let (repo, _temp_dir) = setup_repository().await;
        let sent = sample_event("a");
        let failed = sample_event("b");
        repo.enqueue_batch(&[sent.clone(), failed.clone()]).await.unwrap();

        repo.mark_sent(&sent.id).await.unwrap();
        repo.mark_failed(&failed.id, "bad payload", None).await.unwrap();

        assert!(repo.dequeue_batch(10, Utc::now()).await.unwrap().is_empty());
        assert_eq!(repo.count_by_status(OutboxStatus::Sent).await.unwrap(), 1);
        let parked = repo.find_by_id(&failed.id).await.unwrap().unwrap();
        assert_eq!(parked.status, OutboxStatus::Failed);
        assert!(parked.processed_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn marking_unknown_event_is_not_found() {
        let (repo, _temp_dir) = setup_repository().await;

        let result = repo.mark_sent("missing").await;
        assert!(matches!(result, Err(CalSyncError::NotFound(_))));
    }
}

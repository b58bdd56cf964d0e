//! SQLite-backed implementation of the CalendarEventRepository port.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::CalendarEventRepository;
use calsync_domain::{CalSyncError, CalendarEventRow, EventTime, NewCalendarEvent, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::{from_millis, map_sql_error, to_millis, with_connection, DbManager};

/// Upper bound on ids bound into one `IN (...)` clause.
const DELETE_CHUNK: usize = 500;

const SELECT_COLUMNS: &str = "id, calendar_connection_id, external_id, title, description, location,
        start_time, end_time, is_all_day, raw_data, created_at, updated_at";

// Re-deliveries of an unchanged item leave the row (and updated_at) untouched.
const UPSERT_SQL: &str = "INSERT INTO calendar_events (
        id, calendar_connection_id, external_id, title, description, location,
        start_time, end_time, is_all_day, raw_data, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
    ON CONFLICT (calendar_connection_id, external_id) DO UPDATE SET
        title = excluded.title,
        description = excluded.description,
        location = excluded.location,
        start_time = excluded.start_time,
        end_time = excluded.end_time,
        is_all_day = excluded.is_all_day,
        raw_data = excluded.raw_data,
        updated_at = excluded.updated_at
    WHERE calendar_events.raw_data IS NOT excluded.raw_data
       OR calendar_events.title IS NOT excluded.title
       OR calendar_events.start_time IS NOT excluded.start_time
       OR calendar_events.end_time IS NOT excluded.end_time";

pub struct SqliteCalendarEventRepository {
    db: Arc<DbManager>,
}

impl SqliteCalendarEventRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

fn parse_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<EventTime> {
    let raw: String = row.get(idx)?;
    EventTime::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<CalendarEventRow> {
    let raw_data: String = row.get(9)?;
    let raw_data = serde_json::from_str(&raw_data)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(CalendarEventRow {
        id: row.get(0)?,
        calendar_connection_id: row.get(1)?,
        external_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        location: row.get(5)?,
        start_time: parse_time_column(row, 6)?,
        end_time: parse_time_column(row, 7)?,
        is_all_day: row.get(8)?,
        raw_data,
        created_at: from_millis(row.get(10)?)?,
        updated_at: from_millis(row.get(11)?)?,
    })
}

fn find_by_key(conn: &Connection, connection_id: &str, external_id: &str) -> Result<CalendarEventRow> {
    conn.query_row(
        &format!(
            "SELECT {SELECT_COLUMNS} FROM calendar_events
             WHERE calendar_connection_id = ?1 AND external_id = ?2"
        ),
        params![connection_id, external_id],
        map_event_row,
    )
    .map_err(map_sql_error)
}

fn select_by_external_ids(
    conn: &Connection,
    connection_id: &str,
    external_ids: &[String],
) -> Result<Vec<CalendarEventRow>> {
    let placeholders = vec!["?"; external_ids.len()].join(", ");
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM calendar_events
         WHERE calendar_connection_id = ? AND external_id IN ({placeholders})"
    );
    let bound = std::iter::once(connection_id).chain(external_ids.iter().map(String::as_str));

    let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
    let rows = stmt
        .query_map(params_from_iter(bound), map_event_row)
        .map_err(map_sql_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_sql_error)?;
    Ok(rows)
}

#[async_trait]
impl CalendarEventRepository for SqliteCalendarEventRepository {
    #[instrument(skip_all, fields(count = events.len()))]
    async fn upsert_events(&self, events: &[NewCalendarEvent]) -> Result<Vec<CalendarEventRow>> {
        let events = events.to_vec();

        with_connection(&self.db, move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            let now = to_millis(Utc::now());
            let mut stored = Vec::with_capacity(events.len());

            {
                let mut stmt = tx.prepare_cached(UPSERT_SQL).map_err(map_sql_error)?;
                for event in &events {
                    let raw_data = serde_json::to_string(&event.raw_data).map_err(|e| {
                        CalSyncError::Internal(format!("failed to serialize raw event: {e}"))
                    })?;
                    stmt.execute(params![
                        Uuid::now_v7().to_string(),
                        event.calendar_connection_id,
                        event.external_id,
                        event.title,
                        event.description,
                        event.location,
                        event.start_time.to_storage_string(),
                        event.end_time.to_storage_string(),
                        event.is_all_day,
                        raw_data,
                        now,
                    ])
                    .map_err(map_sql_error)?;
                }
            }

            for event in &events {
                stored.push(find_by_key(&tx, &event.calendar_connection_id, &event.external_id)?);
            }

            tx.commit().map_err(map_sql_error)?;
            debug!(stored = stored.len(), "calendar events upserted");
            Ok(stored)
        })
        .await
    }

    #[instrument(skip(self, external_ids), fields(count = external_ids.len()))]
    async fn delete_by_external_ids(
        &self,
        connection_id: &str,
        external_ids: &[String],
    ) -> Result<Vec<CalendarEventRow>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }

        let connection_id = connection_id.to_string();
        let external_ids = external_ids.to_vec();

        with_connection(&self.db, move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            let mut deleted = Vec::new();

            for chunk in external_ids.chunks(DELETE_CHUNK) {
                let rows = select_by_external_ids(&tx, &connection_id, chunk)?;
                {
                    let mut stmt = tx
                        .prepare_cached(
                            "DELETE FROM calendar_events
                             WHERE calendar_connection_id = ?1 AND external_id = ?2",
                        )
                        .map_err(map_sql_error)?;
                    for row in &rows {
                        stmt.execute(params![connection_id, row.external_id]).map_err(map_sql_error)?;
                    }
                }
                deleted.extend(rows);
            }

            tx.commit().map_err(map_sql_error)?;
            debug!(deleted = deleted.len(), "calendar events deleted");
            Ok(deleted)
        })
        .await
    }

    async fn list_for_connection(&self, connection_id: &str) -> Result<Vec<CalendarEventRow>> {
        let connection_id = connection_id.to_string();

        with_connection(&self.db, move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM calendar_events
                     WHERE calendar_connection_id = ?1
                     ORDER BY start_time ASC, external_id ASC"
                ))
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![connection_id], map_event_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
    }
}

//! SQLite-backed implementation of the ConnectionRepository port.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::ConnectionRepository;
use calsync_domain::{CalSyncError, CalendarConnection, NewCalendarConnection, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::{from_millis, from_millis_opt, map_sql_error, to_millis, with_connection, DbManager};

const SELECT_COLUMNS: &str = "id, user_id, provider, access_token, refresh_token, token_expires_at,
        channel_id, resource_id, channel_token, sync_token, sync_token_version, last_synced_at,
        created_at, updated_at";

pub struct SqliteConnectionRepository {
    db: Arc<DbManager>,
}

impl SqliteConnectionRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Store a connection after the user completed OAuth.
    pub async fn create(&self, new: NewCalendarConnection) -> Result<CalendarConnection> {
        with_connection(&self.db, move |conn| {
            let id = Uuid::now_v7().to_string();
            let now = to_millis(Utc::now());
            conn.execute(
                "INSERT INTO calendar_connections (
                    id, user_id, provider, access_token, refresh_token, token_expires_at,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id,
                    new.user_id,
                    new.provider,
                    new.access_token,
                    new.refresh_token,
                    new.token_expires_at.map(to_millis),
                    now,
                ],
            )
            .map_err(map_sql_error)?;
            find(conn, &id)?.ok_or_else(|| CalSyncError::Internal("inserted connection vanished".into()))
        })
        .await
    }

    /// Record the watch channel registered for a connection.
    ///
    /// Fails with a database error if another connection already holds the pair.
    pub async fn assign_channel(
        &self,
        id: &str,
        channel_id: &str,
        resource_id: &str,
        channel_token: Option<&str>,
    ) -> Result<()> {
        let id = id.to_string();
        let channel_id = channel_id.to_string();
        let resource_id = resource_id.to_string();
        let channel_token = channel_token.map(str::to_string);

        with_connection(&self.db, move |conn| {
            let updated = conn
                .execute(
                    "UPDATE calendar_connections
                     SET channel_id = ?1, resource_id = ?2, channel_token = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![channel_id, resource_id, channel_token, to_millis(Utc::now()), id],
                )
                .map_err(map_sql_error)?;
            ensure_found(updated, &id)
        })
        .await
    }
}

fn map_connection_row(row: &Row<'_>) -> rusqlite::Result<CalendarConnection> {
    Ok(CalendarConnection {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        access_token: row.get(3)?,
        refresh_token: row.get(4)?,
        token_expires_at: from_millis_opt(row.get(5)?)?,
        channel_id: row.get(6)?,
        resource_id: row.get(7)?,
        channel_token: row.get(8)?,
        sync_token: row.get(9)?,
        sync_token_version: row.get(10)?,
        last_synced_at: from_millis_opt(row.get(11)?)?,
        created_at: from_millis(row.get(12)?)?,
        updated_at: from_millis(row.get(13)?)?,
    })
}

fn find(conn: &rusqlite::Connection, id: &str) -> Result<Option<CalendarConnection>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM calendar_connections WHERE id = ?1"),
        params![id],
        map_connection_row,
    )
    .optional()
    .map_err(map_sql_error)
}

fn ensure_found(updated: usize, id: &str) -> Result<()> {
    if updated == 0 {
        return Err(CalSyncError::NotFound(format!("connection {id}")));
    }
    Ok(())
}

#[async_trait]
impl ConnectionRepository for SqliteConnectionRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<CalendarConnection>> {
        let id = id.to_string();
        with_connection(&self.db, move |conn| find(conn, &id)).await
    }

    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<CalendarConnection>> {
        let channel_id = channel_id.to_string();
        let resource_id = resource_id.to_string();

        with_connection(&self.db, move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM calendar_connections
                     WHERE channel_id = ?1 AND resource_id = ?2"
                ),
                params![channel_id, resource_id],
                map_connection_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
    }

    #[instrument(skip(self, access_token))]
    async fn update_credentials(
        &self,
        id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = id.to_string();
        let access_token = access_token.to_string();

        with_connection(&self.db, move |conn| {
            let updated = conn
                .execute(
                    "UPDATE calendar_connections
                     SET access_token = ?1, token_expires_at = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![access_token, to_millis(expires_at), to_millis(Utc::now()), id],
                )
                .map_err(map_sql_error)?;
            ensure_found(updated, &id)
        })
        .await
    }

    #[instrument(skip(self, sync_token))]
    async fn update_sync_token(
        &self,
        id: &str,
        sync_token: &str,
        expected_version: i64,
    ) -> Result<bool> {
        let id = id.to_string();
        let sync_token = sync_token.to_string();

        with_connection(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            let updated = conn
                .execute(
                    "UPDATE calendar_connections
                     SET sync_token = ?1,
                         sync_token_version = sync_token_version + 1,
                         last_synced_at = ?2,
                         updated_at = ?2
                     WHERE id = ?3 AND sync_token_version = ?4",
                    params![sync_token, now, id, expected_version],
                )
                .map_err(map_sql_error)?;

            if updated == 1 {
                return Ok(true);
            }

            // Distinguish a lost race from a missing row.
            match find(conn, &id)? {
                Some(current) => {
                    debug!(current_version = current.sync_token_version, "cursor version moved");
                    Ok(false)
                }
                None => Err(CalSyncError::NotFound(format!("connection {id}"))),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn clear_sync_token(&self, id: &str) -> Result<()> {
        let id = id.to_string();

        with_connection(&self.db, move |conn| {
            let updated = conn
                .execute(
                    "UPDATE calendar_connections
                     SET sync_token = NULL,
                         sync_token_version = sync_token_version + 1,
                         updated_at = ?1
                     WHERE id = ?2",
                    params![to_millis(Utc::now()), id],
                )
                .map_err(map_sql_error)?;
            ensure_found(updated, &id)
        })
        .await
    }
}

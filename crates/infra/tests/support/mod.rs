use std::sync::Arc;

use calsync_domain::{CalendarConnection, NewCalendarConnection};
use calsync_infra::database::{
    DbManager, SqliteCalendarEventRepository, SqliteConnectionRepository, SqliteOutboxRepository,
};
use chrono::{Duration, Utc};
use tempfile::TempDir;

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with migrations applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    pub fn connections(&self) -> SqliteConnectionRepository {
        SqliteConnectionRepository::new(Arc::clone(&self.manager))
    }

    pub fn events(&self) -> SqliteCalendarEventRepository {
        SqliteCalendarEventRepository::new(Arc::clone(&self.manager))
    }

    pub fn outbox(&self) -> SqliteOutboxRepository {
        SqliteOutboxRepository::new(Arc::clone(&self.manager))
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert a connection with a fresh access token and a registered channel.
pub async fn seed_connection(db: &TestDatabase, user_id: &str, channel: &str) -> CalendarConnection {
    let repo = db.connections();
    let created = repo
        .create(NewCalendarConnection {
            user_id: user_id.to_string(),
            provider: "google".to_string(),
            access_token: "access-old".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            token_expires_at: Some(Utc::now() + Duration::hours(1)),
        })
        .await
        .expect("connection should insert");

    repo.assign_channel(&created.id, channel, &format!("res-{channel}"), Some("channel-secret"))
        .await
        .expect("channel should be assigned");

    calsync_core::ConnectionRepository::find_by_id(&repo, &created.id)
        .await
        .expect("lookup succeeds")
        .expect("connection exists")
}

//! SQLite pool helpers
//!
//! Builds the r2d2 pool and applies per-connection pragmas so every pooled
//! connection runs in WAL mode with foreign keys enforced.

use std::path::Path;
use std::time::Duration;

use calsync_domain::{CalSyncError, Result as DomainResult};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, instrument, warn};

pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Pool settings.
#[derive(Debug, Clone)]
pub struct SqlitePoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
    pub busy_timeout: Duration,
    pub enable_wal: bool,
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            enable_wal: true,
        }
    }
}

/// Apply connection-level pragmas.
fn apply_connection_pragmas(conn: &Connection, config: &SqlitePoolConfig) -> rusqlite::Result<()> {
    let mut pragma_sql = String::new();

    if config.enable_wal {
        pragma_sql.push_str("PRAGMA journal_mode=WAL;\n");
    }
    pragma_sql.push_str("PRAGMA synchronous=NORMAL;\n");
    pragma_sql.push_str("PRAGMA foreign_keys=ON;\n");

    conn.execute_batch(&pragma_sql)?;
    conn.busy_timeout(config.busy_timeout)
}

/// Create a pool for the database file at `path`.
#[instrument(skip_all, fields(db_path = %path.as_ref().display(), pool_size = config.max_size))]
pub fn create_sqlite_pool<P: AsRef<Path>>(path: P, config: SqlitePoolConfig) -> DomainResult<SqlitePool> {
    let pragma_config = config.clone();
    let manager = SqliteConnectionManager::file(path.as_ref())
        .with_init(move |conn| apply_connection_pragmas(conn, &pragma_config));

    let pool = Pool::builder()
        .max_size(config.max_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|e| {
            warn!(error = %e, "failed to create connection pool");
            CalSyncError::Database(format!("failed to create pool: {e}"))
        })?;

    debug!("sqlite pool created");
    Ok(pool)
}

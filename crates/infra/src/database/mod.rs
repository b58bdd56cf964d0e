//! Database implementations

pub mod calendar_event_repository;
pub mod connection_repository;
pub mod manager;
pub mod outbox_repository;
pub mod pool;

pub use calendar_event_repository::SqliteCalendarEventRepository;
pub use connection_repository::SqliteConnectionRepository;
pub use manager::{DbManager, SqliteConnection};
pub use outbox_repository::SqliteOutboxRepository;
pub use pool::{create_sqlite_pool, SqlitePool, SqlitePoolConfig};

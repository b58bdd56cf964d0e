//! Domain types and models

pub mod connection;
pub mod event;
pub mod outbox;
pub mod provider;
pub mod sync;

pub use connection::{CalendarConnection, NewCalendarConnection, VerifiedUser};
pub use event::{CalendarEventRow, EventTime, NewCalendarEvent};
pub use outbox::{DomainEvent, DomainEventType, OutboxStatus};
pub use provider::{EventsPage, EventsQuery, ProviderEvent, ProviderEventTime, TokenGrant};
pub use sync::{SyncMode, SyncSummary};

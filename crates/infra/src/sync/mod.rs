//! Outbox delivery
//!
//! - `OutboxDispatcher`: background worker draining `domain_events`
//! - `HttpConflictCheckForwarder`: posts each event to the downstream consumer
//!
//! The dispatcher has explicit lifecycle management with join handle
//! tracking and cancellation support.

mod errors;
pub mod forwarder;
pub mod outbox_dispatcher;

pub use errors::{DispatchError, DispatchErrorCategory};
pub use forwarder::{EventForwarder, HttpConflictCheckForwarder};
pub use outbox_dispatcher::{DispatchStats, OutboxDispatcher, OutboxDispatcherConfig};

//! # Calsync Core
//!
//! Pure sync engine logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for storage, the calendar provider, and identity
//! - The trigger discriminator and access policy
//! - Credential refresh, paginated fetch, reconciliation, and publishing
//! - [`CalendarSyncService`], which runs one invocation end to end
//!
//! ## Architecture Principles
//! - Only depends on `calsync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod sync;

pub use sync::fetch::{select_mode, EventFetcher, FetchOutcome};
pub use sync::ports::{
    CalendarApi, CalendarEventRepository, ConnectionRepository, IdentityVerifier, OutboxQueue,
    ProviderError, WebhookVerifier,
};
pub use sync::publisher::EventPublisher;
pub use sync::reconciler::{ReconcileOutcome, Reconciler};
pub use sync::refresher::{needs_refresh, CredentialRefresher};
pub use sync::service::{CalendarSyncService, SyncOutcome, SyncPorts};
pub use sync::trigger::{
    webhook_verifier_for, ChannelPairVerifier, ChannelTokenVerifier, InboundRequest,
    PushNotification, ResolvedTrigger, Trigger, TriggerResolver,
};

//! Calendar sync service - one invocation end to end

use std::sync::Arc;

use calsync_domain::{CalendarConnection, Result, SyncConfig, SyncSummary};
use chrono::Duration;
use tracing::{info, instrument};

use super::fetch::EventFetcher;
use super::ports::{
    CalendarApi, CalendarEventRepository, ConnectionRepository, IdentityVerifier, OutboxQueue,
    WebhookVerifier,
};
use super::publisher::EventPublisher;
use super::reconciler::Reconciler;
use super::refresher::CredentialRefresher;
use super::trigger::{InboundRequest, Trigger, TriggerResolver};

/// Collaborators injected into the service.
#[derive(Clone)]
pub struct SyncPorts {
    pub connections: Arc<dyn ConnectionRepository>,
    pub events: Arc<dyn CalendarEventRepository>,
    pub outbox: Arc<dyn OutboxQueue>,
    pub calendar: Arc<dyn CalendarApi>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub webhook_verifier: Arc<dyn WebhookVerifier>,
}

/// Terminal result of a successful invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Subscription handshake acknowledged; nothing was synced.
    Handshake,
    Synced(SyncSummary),
}

/// Runs trigger resolution, refresh, fetch, reconcile and publish.
///
/// Holds no per-connection lock; overlapping invocations rely on keyed
/// upserts/deletes and the versioned cursor write.
pub struct CalendarSyncService {
    resolver: TriggerResolver,
    refresher: CredentialRefresher,
    fetcher: EventFetcher,
    reconciler: Reconciler,
    publisher: EventPublisher,
}

impl CalendarSyncService {
    pub fn new(ports: SyncPorts, config: &SyncConfig, calendar_id: impl Into<String>) -> Self {
        let SyncPorts { connections, events, outbox, calendar, identity, webhook_verifier } = ports;

        Self {
            resolver: TriggerResolver::new(
                connections.clone(),
                identity,
                webhook_verifier,
                config.manual_sync_access,
            ),
            refresher: CredentialRefresher::new(
                calendar.clone(),
                connections.clone(),
                Duration::seconds(config.refresh_buffer_seconds),
            ),
            fetcher: EventFetcher::new(
                calendar,
                connections.clone(),
                calendar_id,
                Duration::days(config.full_sync_lookback_days),
            ),
            reconciler: Reconciler::new(events, connections),
            publisher: EventPublisher::new(outbox),
        }
    }

    /// Handle one inbound request.
    pub async fn handle(&self, request: &InboundRequest) -> Result<SyncOutcome> {
        let trigger = Trigger::classify(request);
        if trigger == Trigger::Handshake {
            info!("provider subscription handshake acknowledged");
            return Ok(SyncOutcome::Handshake);
        }

        let resolved = self.resolver.resolve(trigger).await?;
        let summary = self.sync_connection(resolved.connection, resolved.is_manual).await?;
        Ok(SyncOutcome::Synced(summary))
    }

    /// Sync an already-resolved connection.
    #[instrument(skip_all, fields(connection_id = %connection.id, is_manual = is_manual))]
    pub async fn sync_connection(
        &self,
        connection: CalendarConnection,
        is_manual: bool,
    ) -> Result<SyncSummary> {
        let connection = self.refresher.ensure_fresh(connection).await?;
        let fetched = self.fetcher.fetch(&connection, is_manual).await?;
        let outcome = self.reconciler.reconcile(&connection, fetched).await?;
        let published = self.publisher.publish(&connection.user_id, &outcome).await;

        let summary = SyncSummary::new(outcome.upserted.len(), outcome.deleted.len());
        info!(
            events_synced = summary.events_synced,
            events_deleted = summary.events_deleted,
            published,
            "calendar sync completed successfully"
        );
        Ok(summary)
    }
}

//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use calsync_core::{
    webhook_verifier_for, CalendarApi, CalendarEventRepository, CalendarSyncService,
    ConnectionRepository, IdentityVerifier, OutboxQueue, SyncPorts,
};
use calsync_domain::{CalSyncError, Config, Result};
use calsync_infra::sync::{HttpConflictCheckForwarder, OutboxDispatcher, OutboxDispatcherConfig};
use calsync_infra::{
    DbManager, GoogleCalendarClient, HttpIdentityVerifier, SqliteCalendarEventRepository,
    SqliteConnectionRepository, SqliteOutboxRepository,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::utils::health::{ComponentHealth, HealthStatus};

const DISPATCHER_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub sync_service: Arc<CalendarSyncService>,
    pub outbox_queue: Arc<dyn OutboxQueue>,

    /// Present only when `outbox.enabled` is set.
    dispatcher: Mutex<Option<OutboxDispatcher>>,
}

impl AppContext {
    /// Build every dependency from configuration and start the outbox
    /// dispatcher when enabled.
    pub async fn new(config: Config) -> Result<Self> {
        let db = Arc::new(DbManager::from_config(&config.database)?);
        db.run_migrations()?;
        info!(path = %db.path().display(), "database ready");

        let connections: Arc<dyn ConnectionRepository> =
            Arc::new(SqliteConnectionRepository::new(Arc::clone(&db)));
        let events: Arc<dyn CalendarEventRepository> =
            Arc::new(SqliteCalendarEventRepository::new(Arc::clone(&db)));
        let outbox_queue: Arc<dyn OutboxQueue> =
            Arc::new(SqliteOutboxRepository::new(Arc::clone(&db)));
        let calendar: Arc<dyn CalendarApi> = Arc::new(GoogleCalendarClient::new(&config.google)?);
        let identity: Arc<dyn IdentityVerifier> =
            Arc::new(HttpIdentityVerifier::new(&config.identity)?);

        let ports = SyncPorts {
            connections,
            events,
            outbox: Arc::clone(&outbox_queue),
            calendar,
            identity,
            webhook_verifier: webhook_verifier_for(config.webhook.verification),
        };
        let sync_service =
            Arc::new(CalendarSyncService::new(ports, &config.sync, config.google.calendar_id.clone()));

        let dispatcher = if config.outbox.enabled {
            Some(start_dispatcher(&config, Arc::clone(&outbox_queue)).await?)
        } else {
            info!("outbox dispatcher disabled; events stay queued for an external consumer");
            None
        };

        Ok(Self { config, db, sync_service, outbox_queue, dispatcher: Mutex::new(dispatcher) })
    }

    /// Report database connectivity and dispatcher state.
    pub async fn health_check(&self) -> HealthStatus {
        let mut status = HealthStatus::new().add_component(self.check_database_health().await);

        if self.config.outbox.enabled {
            let running =
                self.dispatcher.lock().await.as_ref().is_some_and(OutboxDispatcher::is_running);
            status = status.add_component(if running {
                ComponentHealth::healthy("outbox_dispatcher")
            } else {
                ComponentHealth::unhealthy("outbox_dispatcher", "not running")
            });
        }

        status.calculate_score();
        status
    }

    /// Uses spawn_blocking so the pool checkout never stalls the runtime.
    async fn check_database_health(&self) -> ComponentHealth {
        let db = Arc::clone(&self.db);
        match tokio::task::spawn_blocking(move || db.health_check()).await {
            Ok(Ok(())) => ComponentHealth::healthy("database"),
            Ok(Err(e)) => {
                warn!(error = %e, "database health check failed");
                ComponentHealth::unhealthy("database", format!("query failed: {e}"))
            }
            Err(e) => {
                error!(error = %e, "database health check task panicked");
                ComponentHealth::unhealthy("database", format!("task panic: {e}"))
            }
        }
    }

    /// Stop the outbox dispatcher, if one is running. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutdown called on AppContext");

        let mut guard = self.dispatcher.lock().await;
        if let Some(dispatcher) = guard.as_mut() {
            if dispatcher.is_running() {
                dispatcher.stop().await.map_err(CalSyncError::Internal)?;
            }
        }
        Ok(())
    }
}

async fn start_dispatcher(
    config: &Config,
    outbox_queue: Arc<dyn OutboxQueue>,
) -> Result<OutboxDispatcher> {
    let forwarder = HttpConflictCheckForwarder::from_config(&config.outbox)
        .map_err(|err| CalSyncError::Config(err.to_string()))?;
    let mut dispatcher = OutboxDispatcher::new(
        outbox_queue,
        Arc::new(forwarder),
        OutboxDispatcherConfig::from(&config.outbox),
    );

    tokio::time::timeout(DISPATCHER_START_TIMEOUT, dispatcher.start())
        .await
        .map_err(|_| {
            error!(timeout_secs = DISPATCHER_START_TIMEOUT.as_secs(), "outbox dispatcher start timed out");
            CalSyncError::Internal("outbox dispatcher start timed out".into())
        })?
        .map_err(|err| {
            error!(error = %err, "failed to start outbox dispatcher");
            CalSyncError::Internal(format!("failed to start outbox dispatcher: {err}"))
        })?;

    Ok(dispatcher)
}

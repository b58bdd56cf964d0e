//! Outbox dispatcher for periodic delivery of domain events.
//!
//! Polls `domain_events` for pending rows, forwards each one to the
//! conflict-check consumer, and records the outcome. Join handles are
//! tracked, cancellation is explicit, and every batch runs under a timeout.
//! Sync invocations never wait on this worker.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use calsync_infra::sync::{OutboxDispatcher, OutboxDispatcherConfig};
//!
//! # async fn example() -> Result<(), String> {
//! # let outbox_repo = todo!(); // Arc<dyn OutboxQueue>
//! # let forwarder = todo!(); // Arc<dyn EventForwarder>
//! let mut dispatcher = OutboxDispatcher::new(
//!     outbox_repo,
//!     forwarder,
//!     OutboxDispatcherConfig { poll_interval: Duration::from_secs(10), ..Default::default() },
//! );
//!
//! dispatcher.start().await?;
//! // ... application runs ...
//! dispatcher.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use calsync_core::OutboxQueue;
use calsync_domain::{DomainEvent, OutboxConfig};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::forwarder::EventForwarder;

/// Configuration for the outbox dispatcher.
#[derive(Debug, Clone)]
pub struct OutboxDispatcherConfig {
    /// Maximum number of events to deliver per batch
    pub batch_size: usize,
    /// Interval between polling attempts
    pub poll_interval: Duration,
    /// Timeout for processing a single batch
    pub processing_timeout: Duration,
    /// Delivery attempts before a row is parked as failed
    pub max_attempts: i64,
    /// First retry delay; doubles per attempt
    pub base_backoff: Duration,
    /// Upper bound on the retry delay
    pub max_backoff: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for OutboxDispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_secs(10),
            processing_timeout: Duration::from_secs(120),
            max_attempts: 5,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(60 * 60),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&OutboxConfig> for OutboxDispatcherConfig {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            poll_interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
            max_attempts: config.max_attempts.max(1),
            ..Self::default()
        }
    }
}

/// Counters for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Outbox dispatcher with explicit lifecycle management.
pub struct OutboxDispatcher {
    outbox_repo: Arc<dyn OutboxQueue>,
    forwarder: Arc<dyn EventForwarder>,
    config: OutboxDispatcherConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl OutboxDispatcher {
    pub fn new(
        outbox_repo: Arc<dyn OutboxQueue>,
        forwarder: Arc<dyn EventForwarder>,
        config: OutboxDispatcherConfig,
    ) -> Self {
        Self {
            outbox_repo,
            forwarder,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the dispatcher, spawning the background processing task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Dispatcher already running".to_string());
        }

        info!(
            batch_size = self.config.batch_size,
            poll_secs = self.config.poll_interval.as_secs(),
            "Starting outbox dispatcher"
        );

        self.cancellation = CancellationToken::new();

        let outbox_repo = Arc::clone(&self.outbox_repo);
        let forwarder = Arc::clone(&self.forwarder);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::process_loop(outbox_repo, forwarder, config, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the dispatcher and wait for the processing task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), String> {
        if !self.is_running() {
            return Err("Dispatcher not running".to_string());
        }

        info!("Stopping outbox dispatcher");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Dispatcher task panicked: {}", e);
                    return Err("Dispatcher task panicked".to_string());
                }
                Err(_) => {
                    warn!("Dispatcher task did not complete within timeout");
                    return Err("Dispatcher task timeout".to_string());
                }
            }
        }

        info!("Outbox dispatcher stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a dispatcher task is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Deliver one batch synchronously.
    pub async fn dispatch_once(&self) -> Result<DispatchStats, String> {
        Self::process_batch(&self.outbox_repo, &self.forwarder, &self.config).await
    }

    async fn process_loop(
        outbox_repo: Arc<dyn OutboxQueue>,
        forwarder: Arc<dyn EventForwarder>,
        config: OutboxDispatcherConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Outbox dispatcher loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.poll_interval) => {
                    match tokio::time::timeout(
                        config.processing_timeout,
                        Self::process_batch(&outbox_repo, &forwarder, &config),
                    )
                    .await
                    {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!(error = %e, "Outbox batch failed"),
                        Err(_) => warn!(
                            timeout_secs = config.processing_timeout.as_secs(),
                            "Outbox batch timed out"
                        ),
                    }
                }
            }
        }
    }

    async fn process_batch(
        outbox_repo: &Arc<dyn OutboxQueue>,
        forwarder: &Arc<dyn EventForwarder>,
        config: &OutboxDispatcherConfig,
    ) -> Result<DispatchStats, String> {
        let events = outbox_repo
            .dequeue_batch(config.batch_size, Utc::now())
            .await
            .map_err(|e| format!("Failed to dequeue batch: {e}"))?;

        let mut stats = DispatchStats::default();
        if events.is_empty() {
            debug!("No pending domain events");
            return Ok(stats);
        }

        debug!(count = events.len(), "Dispatching outbox batch");
        let mut fatal_errors: Vec<String> = Vec::new();

        for event in events {
            match forwarder.forward(&event).await {
                Ok(()) => {
                    if let Err(err) = outbox_repo.mark_sent(&event.id).await {
                        warn!(event_id = %event.id, error = %err, "mark_sent failed");
                        fatal_errors.push(format!("mark_sent error for {}: {}", event.id, err));
                    } else {
                        stats.sent += 1;
                    }
                }
                Err(err) => {
                    let retry_at = next_retry_at(&event, err.should_retry(), config);
                    warn!(
                        event_id = %event.id,
                        attempts = event.attempts + 1,
                        will_retry = retry_at.is_some(),
                        error = %err,
                        "Forwarding domain event failed"
                    );

                    let reason = truncate_reason(&err.to_string());
                    if let Err(mark_err) = outbox_repo.mark_failed(&event.id, &reason, retry_at).await {
                        warn!(event_id = %event.id, error = %mark_err, "mark_failed failed");
                        fatal_errors.push(format!("mark_failed error for {}: {}", event.id, mark_err));
                    } else if retry_at.is_some() {
                        stats.retried += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
            }
        }

        debug!(sent = stats.sent, retried = stats.retried, failed = stats.failed, "Outbox batch completed");

        if !fatal_errors.is_empty() {
            return Err(fatal_errors.join("; "));
        }
        Ok(stats)
    }
}

/// Exponential backoff from the attempt count, or `None` once exhausted.
fn next_retry_at(
    event: &DomainEvent,
    retryable: bool,
    config: &OutboxDispatcherConfig,
) -> Option<chrono::DateTime<Utc>> {
    let attempts_after = event.attempts.saturating_add(1);
    if !retryable || attempts_after >= config.max_attempts {
        return None;
    }

    let shift = u32::try_from(attempts_after.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
    let delay = config.base_backoff.saturating_mul(1u32 << shift).min(config.max_backoff);
    let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::hours(1));
    Some(Utc::now() + delay)
}

fn truncate_reason(reason: &str) -> String {
    const MAX_LEN: usize = 256;
    if reason.len() <= MAX_LEN {
        return reason.to_string();
    }

    let mut truncated = reason.chars().take(MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

impl Drop for OutboxDispatcher {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("OutboxDispatcher dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use calsync_domain::{CalSyncError, DomainEventType, Result as DomainResult};
    use chrono::DateTime;
    use serde_json::json;
    use tokio::sync::Mutex as TokioMutex;

    use super::*;
    use crate::sync::errors::DispatchError;

    type FailedStore = Arc<TokioMutex<Vec<(String, String, Option<DateTime<Utc>>)>>>;

    fn sample_event(id: &str, attempts: i64) -> DomainEvent {
        let mut event = DomainEvent::new("user-1", DomainEventType::EventSynced, json!({ "external_id": id }));
        event.id = id.to_string();
        event.attempts = attempts;
        event
    }

    struct MockOutboxRepo {
        events: TokioMutex<Vec<DomainEvent>>,
        sent: TokioMutex<Vec<String>>,
        failed: FailedStore,
        fail_mark_sent: bool,
    }

    impl MockOutboxRepo {
        fn new(events: Vec<DomainEvent>) -> Self {
            Self {
                events: TokioMutex::new(events),
                sent: TokioMutex::new(Vec::new()),
                failed: Arc::new(TokioMutex::new(Vec::new())),
                fail_mark_sent: false,
            }
        }

        fn with_fail_mark_sent(mut self) -> Self {
            self.fail_mark_sent = true;
            self
        }
    }

    #[async_trait]
    impl OutboxQueue for MockOutboxRepo {
        async fn enqueue_batch(&self, events: &[DomainEvent]) -> DomainResult<()> {
            self.events.lock().await.extend_from_slice(events);
            Ok(())
        }

        async fn dequeue_batch(&self, limit: usize, _now: DateTime<Utc>) -> DomainResult<Vec<DomainEvent>> {
            let mut events = self.events.lock().await;
            let batch_len = limit.min(events.len());
            Ok(events.drain(..batch_len).collect())
        }

        async fn mark_sent(&self, id: &str) -> DomainResult<()> {
            if self.fail_mark_sent {
                return Err(CalSyncError::Database("mark_sent failure".into()));
            }
            self.sent.lock().await.push(id.to_string());
            Ok(())
        }

        async fn mark_failed(&self, id: &str, error: &str, retry_at: Option<DateTime<Utc>>) -> DomainResult<()> {
            self.failed.lock().await.push((id.to_string(), error.to_string(), retry_at));
            Ok(())
        }
    }

    struct MockForwarder {
        responses: TokioMutex<Vec<Result<(), DispatchError>>>,
        calls: TokioMutex<usize>,
    }

    impl MockForwarder {
        fn new(responses: Vec<Result<(), DispatchError>>) -> Self {
            Self { responses: TokioMutex::new(responses), calls: TokioMutex::new(0) }
        }
    }

    #[async_trait]
    impl EventForwarder for MockForwarder {
        async fn forward(&self, _event: &DomainEvent) -> Result<(), DispatchError> {
            *self.calls.lock().await += 1;
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                Ok(())
            } else {
                responses.remove(0)
            }
        }
    }

    fn dispatcher(repo: Arc<MockOutboxRepo>, forwarder: Arc<MockForwarder>) -> OutboxDispatcher {
        OutboxDispatcher::new(repo, forwarder, OutboxDispatcherConfig::default())
    }

    #[tokio::test]
    async fn dispatch_once_marks_sent_on_success() {
        let repo = Arc::new(MockOutboxRepo::new(vec![sample_event("evt-1", 0), sample_event("evt-2", 0)]));
        let forwarder = Arc::new(MockForwarder::new(vec![]));

        let stats = dispatcher(repo.clone(), forwarder.clone()).dispatch_once().await.unwrap();

        assert_eq!(stats, DispatchStats { sent: 2, retried: 0, failed: 0 });
        assert_eq!(*repo.sent.lock().await, vec!["evt-1".to_string(), "evt-2".to_string()]);
        assert_eq!(*forwarder.calls.lock().await, 2);
    }

    #[tokio::test]
    async fn retryable_failure_schedules_backoff() {
        let repo = Arc::new(MockOutboxRepo::new(vec![sample_event("evt-1", 1)]));
        let forwarder = Arc::new(MockForwarder::new(vec![Err(DispatchError::Server("503".into()))]));
        let before = Utc::now();

        let stats = dispatcher(repo.clone(), forwarder).dispatch_once().await.unwrap();

        assert_eq!(stats.retried, 1);
        let failed = repo.failed.lock().await;
        let retry_at = failed[0].2.expect("retry scheduled");
        // Second attempt: base backoff doubled once.
        assert!(retry_at >= before + chrono::Duration::seconds(60));
        assert!(retry_at <= Utc::now() + chrono::Duration::seconds(61));
    }

    #[tokio::test]
    async fn exhausted_attempts_park_the_event() {
        let repo = Arc::new(MockOutboxRepo::new(vec![sample_event("evt-1", 4)]));
        let forwarder = Arc::new(MockForwarder::new(vec![Err(DispatchError::Network("reset".into()))]));

        let stats = dispatcher(repo.clone(), forwarder).dispatch_once().await.unwrap();

        assert_eq!(stats.failed, 1);
        assert!(repo.failed.lock().await[0].2.is_none());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let repo = Arc::new(MockOutboxRepo::new(vec![sample_event("evt-1", 0)]));
        let forwarder = Arc::new(MockForwarder::new(vec![Err(DispatchError::Client("422".into()))]));

        let stats = dispatcher(repo.clone(), forwarder).dispatch_once().await.unwrap();

        assert_eq!(stats.failed, 1);
        let failed = repo.failed.lock().await;
        assert_eq!(failed[0].1, "Client error: 422");
        assert!(failed[0].2.is_none());
    }

    #[tokio::test]
    async fn mark_sent_failures_surface_as_batch_error() {
        let repo = Arc::new(MockOutboxRepo::new(vec![sample_event("evt-1", 0)]).with_fail_mark_sent());
        let forwarder = Arc::new(MockForwarder::new(vec![]));

        let result = dispatcher(repo, forwarder).dispatch_once().await;

        assert!(result.unwrap_err().contains("mark_sent error for evt-1"));
    }

    #[tokio::test]
    async fn start_and_stop_lifecycle() {
        let repo = Arc::new(MockOutboxRepo::new(vec![]));
        let forwarder = Arc::new(MockForwarder::new(vec![]));
        let mut dispatcher = OutboxDispatcher::new(
            repo,
            forwarder,
            OutboxDispatcherConfig { poll_interval: Duration::from_millis(10), ..Default::default() },
        );

        dispatcher.start().await.unwrap();
        assert!(dispatcher.is_running());
        assert!(dispatcher.start().await.is_err());

        dispatcher.stop().await.unwrap();
        assert!(!dispatcher.is_running());
        assert!(dispatcher.stop().await.is_err());
    }

    #[test]
    fn truncate_reason_caps_length() {
        let long = "x".repeat(400);
        let truncated = truncate_reason(&long);
        assert_eq!(truncated.len(), 256);
        assert!(truncated.ends_with("..."));
    }
}

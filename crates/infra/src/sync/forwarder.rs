//! Delivery of outbox events to the downstream conflict-check function.

use std::time::Duration;

use async_trait::async_trait;
use calsync_domain::{DomainEvent, OutboxConfig};
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

use super::errors::DispatchError;
use crate::http::{HttpClient, RetryPolicy};

const FORWARD_TIMEOUT_SECS: u64 = 15;

/// Interface for submitting domain events to a remote consumer.
#[async_trait]
pub trait EventForwarder: Send + Sync {
    /// Deliver one event. The event id doubles as the idempotency key.
    async fn forward(&self, event: &DomainEvent) -> Result<(), DispatchError>;
}

/// Wire shape posted to the consumer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForwardedEvent<'a> {
    id: &'a str,
    user_id: &'a str,
    event_type: &'a str,
    source: &'a str,
    payload: &'a serde_json::Value,
    created_at: String,
}

impl<'a> From<&'a DomainEvent> for ForwardedEvent<'a> {
    fn from(event: &'a DomainEvent) -> Self {
        Self {
            id: &event.id,
            user_id: &event.user_id,
            event_type: event.event_type.as_str(),
            source: &event.source,
            payload: &event.payload,
            created_at: event.created_at.to_rfc3339(),
        }
    }
}

/// Posts events as JSON to the conflict-check endpoint.
pub struct HttpConflictCheckForwarder {
    http: HttpClient,
    endpoint: String,
    service_token: Option<String>,
}

impl HttpConflictCheckForwarder {
    pub fn new(endpoint: impl Into<String>, service_token: Option<String>) -> Result<Self, DispatchError> {
        // Retries across polls are the dispatcher's job; keep the client to one shot.
        let http = HttpClient::builder("forwarder")
            .timeout(Duration::from_secs(FORWARD_TIMEOUT_SECS))
            .retry(RetryPolicy::Once)
            .build()?;
        Ok(Self { http, endpoint: endpoint.into(), service_token })
    }

    pub fn from_config(config: &OutboxConfig) -> Result<Self, DispatchError> {
        let endpoint = config
            .dispatch_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| DispatchError::Config("outbox.dispatch_url is required".into()))?;
        Self::new(endpoint, config.service_token.clone())
    }
}

#[async_trait]
impl EventForwarder for HttpConflictCheckForwarder {
    async fn forward(&self, event: &DomainEvent) -> Result<(), DispatchError> {
        let mut request = self
            .http
            .request(Method::POST, &self.endpoint)
            .header("idempotency-key", &event.id)
            .json(&ForwardedEvent::from(event));
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token);
        }

        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::from_status(status.as_u16(), &body));
        }

        debug!(event_id = %event.id, %status, "event forwarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use calsync_domain::DomainEventType;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::sync::errors::DispatchErrorCategory;

    fn sample_event() -> DomainEvent {
        DomainEvent::new(
            "user-1",
            DomainEventType::EventDeleted,
            json!({ "calendar_connection_id": "conn-1", "external_id": "evt-1" }),
        )
    }

    #[tokio::test]
    async fn posts_event_with_service_token() {
        let server = MockServer::start().await;
        let event = sample_event();
        Mock::given(method("POST"))
            .and(path("/functions/v1/conflict-check"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("idempotency-key", event.id.as_str()))
            .and(body_partial_json(json!({
                "userId": "user-1",
                "eventType": "calendar.event.deleted",
                "source": "calendar-sync",
                "payload": { "external_id": "evt-1" }
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let forwarder = HttpConflictCheckForwarder::new(
            format!("{}/functions/v1/conflict-check", server.uri()),
            Some("service-key".into()),
        )
        .unwrap();

        forwarder.forward(&event).await.expect("forwarded");
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let forwarder = HttpConflictCheckForwarder::new(server.uri(), None).unwrap();
        let err = forwarder.forward(&sample_event()).await.unwrap_err();

        assert_eq!(err.category(), DispatchErrorCategory::Server);
        assert!(err.should_retry());
    }

    #[tokio::test]
    async fn rejected_payload_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("unknown event"))
            .mount(&server)
            .await;

        let forwarder = HttpConflictCheckForwarder::new(server.uri(), None).unwrap();
        let err = forwarder.forward(&sample_event()).await.unwrap_err();

        assert!(!err.should_retry());
        assert!(err.to_string().contains("unknown event"));
    }

    #[test]
    fn missing_dispatch_url_is_config_error() {
        let config = OutboxConfig { enabled: true, dispatch_url: None, ..OutboxConfig::default() };
        assert!(matches!(
            HttpConflictCheckForwarder::from_config(&config),
            Err(DispatchError::Config(_))
        ));
    }
}

//! Trigger discriminator
//!
//! Classifies an inbound invocation as the provider's subscription handshake,
//! a push notification, or a manual sync, then resolves it to a connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use calsync_domain::constants::{
    HEADER_AUTHORIZATION, HEADER_CHANNEL_ID, HEADER_CHANNEL_TOKEN, HEADER_RESOURCE_ID,
    HEADER_RESOURCE_STATE, RESOURCE_STATE_SYNC,
};
use calsync_domain::{
    CalSyncError, CalendarConnection, ManualSyncAccess, Result, VerifiedUser,
    WebhookVerification,
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::ports::{ConnectionRepository, IdentityVerifier, WebhookVerifier};

/// Transport-neutral view of an inbound request.
///
/// Header names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
    headers: BTreeMap<String, String>,
    body: Option<String>,
}

impl InboundRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Header value, trimmed; blank values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// Push notification identity carried in provider headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub channel_id: String,
    pub resource_id: String,
    pub channel_token: Option<String>,
}

/// What kind of invocation a request is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Provider's initial-subscription handshake; answered without syncing.
    Handshake,
    Push(PushNotification),
    Manual { bearer_token: Option<String>, body: Option<String> },
}

impl Trigger {
    /// Apply the priority rules: handshake, then push, then manual.
    pub fn classify(request: &InboundRequest) -> Self {
        if request.header(HEADER_RESOURCE_STATE) == Some(RESOURCE_STATE_SYNC) {
            return Self::Handshake;
        }

        if let (Some(channel_id), Some(resource_id)) =
            (request.header(HEADER_CHANNEL_ID), request.header(HEADER_RESOURCE_ID))
        {
            return Self::Push(PushNotification {
                channel_id: channel_id.to_string(),
                resource_id: resource_id.to_string(),
                channel_token: request.header(HEADER_CHANNEL_TOKEN).map(str::to_string),
            });
        }

        Self::Manual {
            bearer_token: request.header(HEADER_AUTHORIZATION).and_then(parse_bearer),
            body: request.body().map(str::to_string),
        }
    }
}

fn parse_bearer(value: &str) -> Option<String> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[derive(Debug, Deserialize)]
struct ManualSyncBody {
    manual_sync: Option<bool>,
    calendar_connection_id: Option<String>,
}

/// Extract the target connection id from a manual-sync body.
pub fn parse_manual_body(body: Option<&str>) -> Result<String> {
    let raw = body
        .filter(|raw| !raw.trim().is_empty())
        .ok_or_else(|| CalSyncError::BadRequest("request body is required".into()))?;

    let parsed: ManualSyncBody = serde_json::from_str(raw)
        .map_err(|e| CalSyncError::BadRequest(format!("invalid JSON body: {e}")))?;

    if parsed.manual_sync != Some(true) {
        return Err(CalSyncError::BadRequest("manual_sync must be true".into()));
    }

    parsed
        .calendar_connection_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CalSyncError::BadRequest("calendar_connection_id is required".into()))
}

/// A trigger resolved to its target connection.
#[derive(Debug, Clone)]
pub struct ResolvedTrigger {
    pub connection: CalendarConnection,
    pub is_manual: bool,
    /// Verified caller, for manual syncs.
    pub caller: Option<VerifiedUser>,
}

/// Accepts any push whose channel pair matched a stored connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelPairVerifier;

impl WebhookVerifier for ChannelPairVerifier {
    fn verify(&self, _connection: &CalendarConnection, _channel_token: Option<&str>) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "channel_pair"
    }
}

/// Additionally requires the channel token registered with the watch channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelTokenVerifier;

impl WebhookVerifier for ChannelTokenVerifier {
    fn verify(&self, connection: &CalendarConnection, channel_token: Option<&str>) -> bool {
        match (connection.channel_token.as_deref(), channel_token) {
            (Some(expected), Some(presented)) if !expected.is_empty() => {
                constant_time_eq(expected.as_bytes(), presented.as_bytes())
            }
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "channel_token"
    }
}

/// Build the verifier selected by configuration.
pub fn webhook_verifier_for(mode: WebhookVerification) -> Arc<dyn WebhookVerifier> {
    match mode {
        WebhookVerification::ChannelPair => Arc::new(ChannelPairVerifier),
        WebhookVerification::ChannelToken => Arc::new(ChannelTokenVerifier),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

/// Resolves push and manual triggers to connections.
pub struct TriggerResolver {
    connections: Arc<dyn ConnectionRepository>,
    identity: Arc<dyn IdentityVerifier>,
    webhook_verifier: Arc<dyn WebhookVerifier>,
    access: ManualSyncAccess,
}

impl TriggerResolver {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        identity: Arc<dyn IdentityVerifier>,
        webhook_verifier: Arc<dyn WebhookVerifier>,
        access: ManualSyncAccess,
    ) -> Self {
        Self { connections, identity, webhook_verifier, access }
    }

    /// Resolve a non-handshake trigger.
    ///
    /// Handshakes never reach the store; resolving one is a caller bug.
    pub async fn resolve(&self, trigger: Trigger) -> Result<ResolvedTrigger> {
        match trigger {
            Trigger::Handshake => {
                Err(CalSyncError::Internal("handshake triggers have no connection".into()))
            }
            Trigger::Push(push) => self.resolve_push(push).await,
            Trigger::Manual { bearer_token, body } => {
                self.resolve_manual(bearer_token.as_deref(), body.as_deref()).await
            }
        }
    }

    async fn resolve_push(&self, push: PushNotification) -> Result<ResolvedTrigger> {
        let connection = self
            .connections
            .find_by_channel(&push.channel_id, &push.resource_id)
            .await?
            .ok_or_else(|| {
                warn!(
                    channel_id = %push.channel_id,
                    resource_id = %push.resource_id,
                    "push notification matched no connection"
                );
                CalSyncError::NotFound("no connection for channel".into())
            })?;

        if !self.webhook_verifier.verify(&connection, push.channel_token.as_deref()) {
            warn!(
                connection_id = %connection.id,
                verifier = self.webhook_verifier.name(),
                "push notification failed verification"
            );
            return Err(CalSyncError::Unauthorized("push notification not verified".into()));
        }

        debug!(connection_id = %connection.id, "resolved push notification");
        Ok(ResolvedTrigger { connection, is_manual: false, caller: None })
    }

    async fn resolve_manual(
        &self,
        bearer_token: Option<&str>,
        body: Option<&str>,
    ) -> Result<ResolvedTrigger> {
        let token = bearer_token
            .ok_or_else(|| CalSyncError::Unauthorized("missing bearer token".into()))?;
        let caller = self.identity.verify(token).await?;

        let connection_id = parse_manual_body(body)?;
        let connection = self
            .connections
            .find_by_id(&connection_id)
            .await?
            .ok_or_else(|| CalSyncError::NotFound(format!("connection {connection_id}")))?;

        self.authorize(&caller, &connection)?;

        debug!(connection_id = %connection.id, caller = %caller.id, "resolved manual sync");
        Ok(ResolvedTrigger { connection, is_manual: true, caller: Some(caller) })
    }

    fn authorize(&self, caller: &VerifiedUser, connection: &CalendarConnection) -> Result<()> {
        match self.access {
            ManualSyncAccess::AnyAuthenticated => Ok(()),
            ManualSyncAccess::OwnerOnly if caller.id == connection.user_id => Ok(()),
            ManualSyncAccess::OwnerOnly => {
                warn!(
                    connection_id = %connection.id,
                    caller = %caller.id,
                    "manual sync requested for a connection owned by another user"
                );
                Err(CalSyncError::Forbidden("connection belongs to another user".into()))
            }
        }
    }
}

//! Configuration structures
//!
//! Loaded by `calsync_infra::config` from the environment or a TOML/JSON
//! file. Every section except `database`, `google` and `identity` has
//! defaults so a minimal file only names the collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALENDAR_ID, DEFAULT_FULL_SYNC_LOOKBACK_DAYS, DEFAULT_OUTBOX_BATCH_SIZE,
    DEFAULT_OUTBOX_MAX_ATTEMPTS, DEFAULT_OUTBOX_POLL_SECS, DEFAULT_REFRESH_BUFFER_SECS,
};

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// `["*"]` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_allowed_origins: default_cors_origins(),
            log_format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), pool_size: default_pool_size() }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl GoogleConfig {
    /// OAuth client credentials with the public Google endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: default_token_endpoint(),
            api_base: default_api_base(),
            calendar_id: default_calendar_id(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_endpoint", &self.token_endpoint)
            .field("api_base", &self.api_base)
            .field("calendar_id", &self.calendar_id)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Identity provider used to verify manual-sync bearer tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Endpoint returning the user behind a bearer token (e.g. `/auth/v1/user`).
    pub user_endpoint: String,
    /// Project API key sent as the `apikey` header, when the provider needs one.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("user_endpoint", &self.user_endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_refresh_buffer")]
    pub refresh_buffer_seconds: i64,
    #[serde(default = "default_lookback_days")]
    pub full_sync_lookback_days: i64,
    #[serde(default)]
    pub manual_sync_access: ManualSyncAccess,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_buffer_seconds: default_refresh_buffer(),
            full_sync_lookback_days: default_lookback_days(),
            manual_sync_access: ManualSyncAccess::default(),
        }
    }
}

/// Who may trigger a manual sync of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualSyncAccess {
    /// Only the connection's owner.
    #[default]
    OwnerOnly,
    /// Any verified user (no ownership check).
    AnyAuthenticated,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Conflict-check endpoint receiving each domain event.
    #[serde(default)]
    pub dispatch_url: Option<String>,
    #[serde(default)]
    pub service_token: Option<String>,
    #[serde(default = "default_outbox_batch")]
    pub batch_size: usize,
    #[serde(default = "default_outbox_poll")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_outbox_attempts")]
    pub max_attempts: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dispatch_url: None,
            service_token: None,
            batch_size: default_outbox_batch(),
            poll_interval_seconds: default_outbox_poll(),
            max_attempts: default_outbox_attempts(),
        }
    }
}

impl fmt::Debug for OutboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboxConfig")
            .field("enabled", &self.enabled)
            .field("dispatch_url", &self.dispatch_url)
            .field("service_token", &self.service_token.as_ref().map(|_| "<redacted>"))
            .field("batch_size", &self.batch_size)
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub verification: WebhookVerification,
}

/// How a push notification is authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookVerification {
    /// Channel id + resource id match only.
    #[default]
    ChannelPair,
    /// Pair match plus the stored channel token.
    ChannelToken,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_pool_size() -> u32 {
    4
}

fn default_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_calendar_id() -> String {
    DEFAULT_CALENDAR_ID.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_refresh_buffer() -> i64 {
    DEFAULT_REFRESH_BUFFER_SECS
}

fn default_lookback_days() -> i64 {
    DEFAULT_FULL_SYNC_LOOKBACK_DAYS
}

fn default_outbox_batch() -> usize {
    DEFAULT_OUTBOX_BATCH_SIZE
}

fn default_outbox_poll() -> u64 {
    DEFAULT_OUTBOX_POLL_SECS
}

fn default_outbox_attempts() -> i64 {
    DEFAULT_OUTBOX_MAX_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "database": { "path": "calsync.db" },
                "google": { "client_id": "id", "client_secret": "secret" },
                "identity": { "user_endpoint": "https://id.example/auth/v1/user" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.database, DatabaseConfig::new("calsync.db"));
        assert_eq!(config.google, GoogleConfig::new("id", "secret"));
        assert_eq!(config.sync.refresh_buffer_seconds, 300);
        assert_eq!(config.sync.full_sync_lookback_days, 30);
        assert_eq!(config.sync.manual_sync_access, ManualSyncAccess::OwnerOnly);
        assert_eq!(config.webhook.verification, WebhookVerification::ChannelPair);
        assert!(!config.outbox.enabled);
        assert_eq!(config.outbox.batch_size, 50);
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn policy_enums_use_snake_case() {
        let access: ManualSyncAccess = serde_json::from_str("\"any_authenticated\"").unwrap();
        assert_eq!(access, ManualSyncAccess::AnyAuthenticated);
        let mode: WebhookVerification = serde_json::from_str("\"channel_token\"").unwrap();
        assert_eq!(mode, WebhookVerification::ChannelToken);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", GoogleConfig::new("id", "very-secret"));
        assert!(!rendered.contains("very-secret"));
    }
}

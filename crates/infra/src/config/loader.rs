//! Configuration loader
//!
//! Loads service configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. `CALSYNC_CONFIG` names an explicit file: load it and stop
//! 2. Otherwise attempt to load from environment variables
//! 3. If required variables are missing, probe for a config file
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `CALSYNC_DB_PATH`: Database file path
//! - `CALSYNC_GOOGLE_CLIENT_ID` / `CALSYNC_GOOGLE_CLIENT_SECRET`: OAuth client
//! - `CALSYNC_IDENTITY_USER_ENDPOINT`: Identity provider user endpoint
//!
//! Optional:
//! - `CALSYNC_DB_POOL_SIZE`, `CALSYNC_BIND_ADDR`, `CALSYNC_CORS_ORIGINS` (comma separated),
//!   `CALSYNC_LOG_FORMAT` (`pretty`/`json`)
//! - `CALSYNC_GOOGLE_TOKEN_ENDPOINT`, `CALSYNC_GOOGLE_API_BASE`, `CALSYNC_GOOGLE_CALENDAR_ID`
//! - `CALSYNC_IDENTITY_API_KEY`
//! - `CALSYNC_REFRESH_BUFFER_SECS`, `CALSYNC_FULL_SYNC_LOOKBACK_DAYS`,
//!   `CALSYNC_MANUAL_SYNC_ACCESS` (`owner_only`/`any_authenticated`)
//! - `CALSYNC_WEBHOOK_VERIFICATION` (`channel_pair`/`channel_token`)
//! - `CALSYNC_OUTBOX_ENABLED`, `CALSYNC_OUTBOX_DISPATCH_URL`, `CALSYNC_OUTBOX_SERVICE_TOKEN`,
//!   `CALSYNC_OUTBOX_BATCH_SIZE`, `CALSYNC_OUTBOX_POLL_SECS`, `CALSYNC_OUTBOX_MAX_ATTEMPTS`
//!
//! ## File Locations
//! The loader probes `calsync.{toml,json}` then `config.{toml,json}` in the
//! current directory, its parent, and next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use calsync_domain::{
    CalSyncError, Config, DatabaseConfig, GoogleConfig, IdentityConfig, LogFormat,
    ManualSyncAccess, OutboxConfig, Result, ServerConfig, SyncConfig, WebhookConfig,
    WebhookVerification,
};

const CONFIG_PATH_VAR: &str = "CALSYNC_CONFIG";

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `CalSyncError::Config` if neither source yields a complete,
/// valid configuration.
pub fn load() -> Result<Config> {
    if let Some(path) = env_opt(CONFIG_PATH_VAR) {
        return load_from_file(Some(PathBuf::from(path)));
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `CalSyncError::Config` if required variables are missing or
/// have invalid values.
pub fn load_from_env() -> Result<Config> {
    let mut database = DatabaseConfig::new(env_var("CALSYNC_DB_PATH")?);
    if let Some(size) = env_parse::<u32>("CALSYNC_DB_POOL_SIZE")? {
        database.pool_size = size;
    }

    let mut google = GoogleConfig::new(
        env_var("CALSYNC_GOOGLE_CLIENT_ID")?,
        env_var("CALSYNC_GOOGLE_CLIENT_SECRET")?,
    );
    if let Some(endpoint) = env_opt("CALSYNC_GOOGLE_TOKEN_ENDPOINT") {
        google.token_endpoint = endpoint;
    }
    if let Some(base) = env_opt("CALSYNC_GOOGLE_API_BASE") {
        google.api_base = base;
    }
    if let Some(calendar_id) = env_opt("CALSYNC_GOOGLE_CALENDAR_ID") {
        google.calendar_id = calendar_id;
    }

    let identity = IdentityConfig {
        user_endpoint: env_var("CALSYNC_IDENTITY_USER_ENDPOINT")?,
        api_key: env_opt("CALSYNC_IDENTITY_API_KEY"),
    };

    let mut server = ServerConfig::default();
    if let Some(addr) = env_opt("CALSYNC_BIND_ADDR") {
        server.bind_addr = addr;
    }
    if let Some(origins) = env_opt("CALSYNC_CORS_ORIGINS") {
        server.cors_allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(format) = env_opt("CALSYNC_LOG_FORMAT") {
        server.log_format = parse_log_format(&format)?;
    }

    let mut sync = SyncConfig::default();
    if let Some(buffer) = env_parse::<i64>("CALSYNC_REFRESH_BUFFER_SECS")? {
        sync.refresh_buffer_seconds = buffer;
    }
    if let Some(days) = env_parse::<i64>("CALSYNC_FULL_SYNC_LOOKBACK_DAYS")? {
        sync.full_sync_lookback_days = days;
    }
    if let Some(access) = env_opt("CALSYNC_MANUAL_SYNC_ACCESS") {
        sync.manual_sync_access = parse_manual_access(&access)?;
    }

    let mut webhook = WebhookConfig::default();
    if let Some(mode) = env_opt("CALSYNC_WEBHOOK_VERIFICATION") {
        webhook.verification = parse_webhook_verification(&mode)?;
    }

    let mut outbox = OutboxConfig {
        enabled: env_bool("CALSYNC_OUTBOX_ENABLED", false),
        dispatch_url: env_opt("CALSYNC_OUTBOX_DISPATCH_URL"),
        service_token: env_opt("CALSYNC_OUTBOX_SERVICE_TOKEN"),
        ..OutboxConfig::default()
    };
    if let Some(size) = env_parse::<usize>("CALSYNC_OUTBOX_BATCH_SIZE")? {
        outbox.batch_size = size;
    }
    if let Some(secs) = env_parse::<u64>("CALSYNC_OUTBOX_POLL_SECS")? {
        outbox.poll_interval_seconds = secs;
    }
    if let Some(attempts) = env_parse::<i64>("CALSYNC_OUTBOX_MAX_ATTEMPTS")? {
        outbox.max_attempts = attempts;
    }

    Ok(Config { server, database, google, identity, sync, outbox, webhook })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations via
/// [`probe_config_paths`].
///
/// # Errors
/// Returns `CalSyncError::Config` if the file is missing or invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalSyncError::Config(
                "No configuration in environment and no config file in any standard location"
                    .to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CalSyncError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content; format follows the extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CalSyncError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CalSyncError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(CalSyncError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Returns the first existing candidate, or `None`.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["calsync.toml", "calsync.json", "config.toml", "config.json"];

    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join(".."));
        dirs.insert(0, cwd);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pretty" | "text" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(CalSyncError::Config(format!("Invalid log format: {other}"))),
    }
}

fn parse_manual_access(raw: &str) -> Result<ManualSyncAccess> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "owner_only" => Ok(ManualSyncAccess::OwnerOnly),
        "any_authenticated" => Ok(ManualSyncAccess::AnyAuthenticated),
        other => Err(CalSyncError::Config(format!("Invalid manual sync access policy: {other}"))),
    }
}

fn parse_webhook_verification(raw: &str) -> Result<WebhookVerification> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "channel_pair" => Ok(WebhookVerification::ChannelPair),
        "channel_token" => Ok(WebhookVerification::ChannelToken),
        other => Err(CalSyncError::Config(format!("Invalid webhook verification mode: {other}"))),
    }
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        CalSyncError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Optional variable; blank values count as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| CalSyncError::Config(format!("Invalid value for {}: {}", key, e)))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

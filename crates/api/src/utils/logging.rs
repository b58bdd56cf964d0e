//! Tracing subscriber setup and log helpers for the HTTP layer.

use calsync_domain::{CalSyncError, LogFormat};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the default `info` filter. Calling this twice is
/// harmless; the second install is ignored.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init()
        }
    };

    if installed.is_ok() {
        info!(?format, "tracing initialised");
    }
}

/// Log the outcome of one sync request with structured fields.
#[inline]
pub fn log_request_outcome(route: &str, elapsed_ms: u64, result: Result<(), &CalSyncError>) {
    match result {
        Ok(()) => info!(route, elapsed_ms, "sync_request_success"),
        Err(err) if err.http_status() >= 500 => {
            error!(route, elapsed_ms, error_code = err.code(), error = %err, "sync_request_failure")
        }
        Err(err) => {
            warn!(route, elapsed_ms, error_code = err.code(), error = %err, "sync_request_rejected")
        }
    }
}

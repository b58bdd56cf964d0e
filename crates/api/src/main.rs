//! Calsync - calendar sync service
//!
//! Main entry point for the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use calsync_api::utils::logging::init_tracing;
use calsync_api::{router, AppContext};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before config loading so `.env` values are visible to it.
    let dotenv = dotenvy::dotenv();

    let config = calsync_infra::config::load().context("failed to load configuration")?;
    init_tracing(config.server.log_format);

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(e) => warn!(error = %e, "no .env file loaded"),
    }

    let bind_addr = config.server.bind_addr.clone();
    let ctx = Arc::new(AppContext::new(config).await.context("failed to build application context")?);

    let listener =
        TcpListener::bind(bind_addr.as_str()).await.with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "calsync listening");

    axum::serve(listener, router(Arc::clone(&ctx)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Err(err) = ctx.shutdown().await {
        error!(error = %err, "shutdown did not complete cleanly");
    }
    info!("calsync stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

//! Router construction.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::context::AppContext;
use crate::handlers;

/// Build the service router with CORS and request tracing applied.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = build_cors_layer(&ctx.config.server.cors_allowed_origins);

    Router::new()
        .route("/", post(handlers::sync).options(handlers::options))
        .route("/sync", post(handlers::sync).options(handlers::options))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

/// `["*"]` (or an empty list) allows any origin; otherwise only the listed
/// origins are echoed back.
pub fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let is_wildcard = origins.is_empty() || origins.iter().any(|o| o == "*");

    let allow_origin = if is_wildcard {
        AllowOrigin::any()
    } else {
        let allowed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(%origin, "ignoring unparsable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST, Method::OPTIONS, Method::GET])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600))
}

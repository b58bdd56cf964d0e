//! HTTP handlers for the sync endpoint and health probe.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use calsync_core::{InboundRequest, SyncOutcome};
use calsync_domain::CalSyncError;
use serde_json::json;
use tracing::debug;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::utils::logging::log_request_outcome;

/// Convert transport headers and body into the engine's request view.
///
/// Non-UTF-8 header values are dropped; an empty body counts as absent.
pub fn inbound_request(headers: &HeaderMap, body: String) -> InboundRequest {
    let mut request = headers.iter().fold(InboundRequest::new(), |request, (name, value)| {
        match value.to_str() {
            Ok(value) => request.with_header(name.as_str(), value),
            Err(_) => {
                debug!(header = %name, "skipping non-UTF-8 header value");
                request
            }
        }
    });
    if !body.trim().is_empty() {
        request = request.with_body(body);
    }
    request
}

/// `POST /` and `POST /sync`: handshake, push notification or manual sync.
pub async fn sync(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let started = Instant::now();

    let result = match decode_body(body) {
        Ok(body) => ctx.sync_service.handle(&inbound_request(&headers, body)).await,
        Err(err) => Err(err),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    log_request_outcome("sync", elapsed_ms, result.as_ref().map(|_| ()));

    match result? {
        SyncOutcome::Handshake => Ok(Json(json!({ "message": "Sync OK" })).into_response()),
        SyncOutcome::Synced(summary) => Ok(Json(summary).into_response()),
    }
}

fn decode_body(body: Bytes) -> Result<String, CalSyncError> {
    String::from_utf8(body.to_vec())
        .map_err(|e| CalSyncError::BadRequest(format!("request body is not valid UTF-8: {e}")))
}

/// Plain `OPTIONS` without preflight headers; preflights are answered by the
/// CORS layer before reaching here.
pub async fn options() -> StatusCode {
    StatusCode::OK
}

/// `GET /health`
pub async fn health(State(ctx): State<Arc<AppContext>>) -> Response {
    let status = ctx.health_check().await;
    let code = if status.is_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(status)).into_response()
}

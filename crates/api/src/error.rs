//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use calsync_domain::CalSyncError;
use serde::Serialize;

/// Wire shape of every error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
    /// Provider status, for upstream errors only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Domain error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub CalSyncError);

impl From<CalSyncError> for ApiError {
    fn from(err: CalSyncError) -> Self {
        Self(err)
    }
}

impl From<&CalSyncError> for ErrorResponse {
    fn from(err: &CalSyncError) -> Self {
        let (status, body) = match err {
            CalSyncError::UpstreamProvider { status, body } => (Some(*status), Some(body.clone())),
            _ => (None, None),
        };
        Self { error: err.code(), message: err.to_string(), retryable: err.is_retryable(), status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

//! Bearer-token verification against the identity provider's user endpoint.

use std::time::Duration;

use async_trait::async_trait;
use calsync_core::IdentityVerifier;
use calsync_domain::{CalSyncError, IdentityConfig, Result, VerifiedUser};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::http::{HttpClient, RetryPolicy};

const IDENTITY_TIMEOUT_SECS: u64 = 10;

/// Resolves a caller's bearer token to a user by calling `GET user_endpoint`.
pub struct HttpIdentityVerifier {
    http: HttpClient,
    user_endpoint: String,
    api_key: Option<String>,
}

impl HttpIdentityVerifier {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        if config.user_endpoint.trim().is_empty() {
            return Err(CalSyncError::Config("identity.user_endpoint is required".into()));
        }

        let http = HttpClient::builder("identity")
            .timeout(Duration::from_secs(IDENTITY_TIMEOUT_SECS))
            .retry(RetryPolicy::transient(2))
            .build()?;

        Ok(Self {
            http,
            user_endpoint: config.user_endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    #[instrument(skip_all)]
    async fn verify(&self, bearer_token: &str) -> Result<VerifiedUser> {
        let mut request =
            self.http.request(Method::GET, &self.user_endpoint).bearer_auth(bearer_token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = self.http.send(request).await?;
        let status = response.status();

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(CalSyncError::Unauthorized("invalid or expired token".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalSyncError::UpstreamProvider { status: status.as_u16(), body });
        }

        let user: UserResponse = response.json().await.map_err(|e| {
            CalSyncError::UpstreamProvider {
                status: status.as_u16(),
                body: format!("malformed identity response: {e}"),
            }
        })?;

        if user.id.trim().is_empty() {
            return Err(CalSyncError::Unauthorized("identity provider returned no user".into()));
        }

        debug!(user_id = %user.id, "bearer token verified");
        Ok(VerifiedUser { id: user.id, email: user.email })
    }
}

use std::time::Duration;

use calsync_domain::CalSyncError;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::errors::InfraError;

/// `User-Agent` sent on every outbound call.
pub const USER_AGENT: &str = concat!("calsync/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// How often a call to an upstream may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// One send; whatever comes back goes to the caller.
    Once,
    /// Resend on connect errors, timeouts, 5xx and 429, up to `attempts`
    /// sends in total. The pause doubles after each resend.
    Transient { attempts: u32, backoff: Duration },
}

impl RetryPolicy {
    pub fn transient(attempts: u32) -> Self {
        Self::Transient { attempts: attempts.max(1), backoff: DEFAULT_BACKOFF }
    }

    fn attempts(&self) -> u32 {
        match self {
            Self::Once => 1,
            Self::Transient { attempts, .. } => (*attempts).max(1),
        }
    }

    /// Pause before resend number `resend` (1-based).
    fn delay_before(&self, resend: u32) -> Duration {
        match self {
            Self::Once => Duration::ZERO,
            Self::Transient { backoff, .. } => {
                backoff.saturating_mul(1u32 << resend.saturating_sub(1).min(8))
            }
        }
    }
}

/// reqwest client bound to one upstream (`google`, `identity`, `forwarder`)
/// and its retry policy.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    upstream: &'static str,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn builder(upstream: &'static str) -> HttpClientBuilder {
        HttpClientBuilder { upstream, timeout: DEFAULT_TIMEOUT, retry: RetryPolicy::Once }
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Send `builder` under this client's retry policy.
    ///
    /// Non-success statuses are returned as responses for the caller to
    /// classify; only transport failures become errors. A request whose body
    /// cannot be cloned is sent once.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, CalSyncError> {
        let attempts = self.retry.attempts();
        let mut pending = Some(builder);
        let mut attempt = 1u32;

        loop {
            let copy = if attempt < attempts {
                pending.as_ref().and_then(RequestBuilder::try_clone)
            } else {
                None
            };
            let may_resend = copy.is_some();
            let current = match copy {
                Some(copy) => copy,
                None => pending
                    .take()
                    .ok_or_else(|| CalSyncError::Internal("outbound request already consumed".into()))?,
            };

            let request = current.build().map_err(|e| CalSyncError::from(InfraError::from(e)))?;
            let method = request.method().clone();
            let url = redact_query(request.url());
            debug!(upstream = self.upstream, attempt, %method, %url, "sending request");

            let outcome = self.client.execute(request).await;
            let transient = match &outcome {
                Ok(response) => is_transient_status(response.status()),
                Err(err) => is_transient_error(err),
            };

            if may_resend && transient {
                drop(outcome);
                let delay = self.retry.delay_before(attempt);
                debug!(upstream = self.upstream, attempt, ?delay, "transient failure, resending");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return match outcome {
                Ok(response) => {
                    debug!(upstream = self.upstream, attempt, status = %response.status(), "response received");
                    Ok(response)
                }
                Err(err) => {
                    debug!(upstream = self.upstream, attempt, %url, error = %err, "request failed");
                    Err(CalSyncError::from(InfraError::from(err)))
                }
            };
        }
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    upstream: &'static str,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<HttpClient, CalSyncError> {
        let client = ReqwestClient::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
            .map_err(|e| CalSyncError::from(InfraError::from(e)))?;

        Ok(HttpClient { client, upstream: self.upstream, retry: self.retry })
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

// Sync and page tokens travel in the query string; keep them out of logs.
fn redact_query(url: &reqwest::Url) -> String {
    let mut shown = url.clone();
    if shown.query().is_some() {
        shown.set_query(Some("redacted"));
    }
    shown.to_string()
}

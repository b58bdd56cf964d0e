//! Google Calendar provider implementation

use std::time::Duration;

use async_trait::async_trait;
use calsync_core::{CalendarApi, ProviderError};
use calsync_domain::{CalSyncError, EventsPage, EventsQuery, GoogleConfig, ProviderEvent, TokenGrant};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::http::{HttpClient, RetryPolicy};

/// Events-list and refresh-grant client for one OAuth application.
///
/// Requests are sent once; retry policy belongs to the caller, since a
/// repeated list call with a stale page token is not meaningful.
pub struct GoogleCalendarClient {
    http: HttpClient,
    api_base: Url,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleConfig) -> Result<Self, CalSyncError> {
        let http = HttpClient::builder("google")
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .retry(RetryPolicy::Once)
            .build()?;

        let api_base = Url::parse(&config.api_base).map_err(|e| {
            CalSyncError::Config(format!("invalid google api_base '{}': {e}", config.api_base))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(CalSyncError::Config(format!(
                "google api_base '{}' cannot carry a path",
                config.api_base
            )));
        }

        Ok(Self {
            http,
            api_base,
            token_endpoint: config.token_endpoint.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url, ProviderError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Decode("api base cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["calendars", calendar_id, "events"]);
        Ok(url)
    }
}

fn query_params(query: &EventsQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(4);
    if let Some(token) = &query.sync_token {
        params.push(("syncToken", token.clone()));
    }
    if let Some(time_min) = query.time_min {
        params.push(("timeMin", time_min.to_rfc3339()));
    }
    if let Some(page) = &query.page_token {
        params.push(("pageToken", page.clone()));
    }
    if query.single_events {
        params.push(("singleEvents", "true".to_string()));
    }
    params
}

fn transport(err: CalSyncError) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

async fn read_body(response: Response) -> String {
    response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string())
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    #[instrument(skip_all, fields(calendar_id = %query.calendar_id, incremental = query.sync_token.is_some()))]
    async fn list_events(
        &self,
        access_token: &str,
        query: &EventsQuery,
    ) -> Result<EventsPage, ProviderError> {
        let url = self.events_url(&query.calendar_id)?;
        let request = self
            .http
            .request(Method::GET, url)
            .bearer_auth(access_token)
            .query(&query_params(query));

        let response = self.http.send(request).await.map_err(transport)?;
        let status = response.status();

        if status == StatusCode::GONE {
            return Err(ProviderError::Gone(read_body(response).await));
        }
        if !status.is_success() {
            return Err(ProviderError::Status { status: status.as_u16(), body: read_body(response).await });
        }

        let body: GoogleEventsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("events list: {e}")))?;

        let mut items = Vec::with_capacity(body.items.len());
        for raw in body.items {
            match ProviderEvent::from_raw(raw.clone()) {
                Ok(event) => items.push(event),
                Err(err) => match ProviderEvent::cancellation_from_raw(raw) {
                    Some(event) => {
                        debug!(error = %err, "keeping cancellation with undecodable fields");
                        items.push(event);
                    }
                    None => warn!(error = %err, "skipping undecodable provider event"),
                },
            }
        }

        debug!(
            items = items.len(),
            has_next_page = body.next_page_token.is_some(),
            has_sync_token = body.next_sync_token.is_some(),
            "events page received"
        );

        Ok(EventsPage {
            items,
            next_page_token: body.next_page_token,
            next_sync_token: body.next_sync_token,
        })
    }

    #[instrument(skip_all)]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        let request = self.http.request(Method::POST, &self.token_endpoint).form(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

        let response = self.http.send(request).await.map_err(transport)?;
        let status = response.status();

        if !status.is_success() {
            let body = read_body(response).await;
            return Err(classify_token_failure(status, body));
        }

        let grant: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("token response: {e}")))?;

        Ok(TokenGrant { access_token: grant.access_token, expires_in: grant.expires_in })
    }
}

// 400/401 with an OAuth error object means the grant itself was refused.
fn classify_token_failure(status: StatusCode, body: String) -> ProviderError {
    let is_client_error = matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED);
    match serde_json::from_str::<GoogleTokenError>(&body) {
        Ok(err) if is_client_error => {
            let detail = err.error_description.unwrap_or_default();
            if detail.is_empty() {
                ProviderError::GrantRejected(err.error)
            } else {
                ProviderError::GrantRejected(format!("{}: {detail}", err.error))
            }
        }
        _ => ProviderError::Status { status: status.as_u16(), body },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenError {
    error: String,
    error_description: Option<String>,
}

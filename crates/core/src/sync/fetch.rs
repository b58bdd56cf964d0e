//! Incremental fetch loop
//!
//! Pages through the provider's events list, either from the stored cursor
//! or from a bounded look-back window, and collects every item.

use std::collections::HashSet;
use std::sync::Arc;

use calsync_domain::{
    CalSyncError, CalendarConnection, EventsQuery, ProviderEvent, Result, SyncMode,
};
use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};

use super::ports::{CalendarApi, ConnectionRepository, ProviderError};

/// Everything one fetch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub mode: SyncMode,
    pub items: Vec<ProviderEvent>,
    /// Cursor for the next incremental run, when the provider sent one.
    pub next_sync_token: Option<String>,
    pub pages: usize,
}

/// Incremental only when a cursor is stored and the caller did not ask for
/// a manual (full) sync.
pub fn select_mode(connection: &CalendarConnection, is_manual: bool) -> SyncMode {
    match connection.sync_token.as_deref() {
        Some(token) if !is_manual && !token.is_empty() => SyncMode::Incremental,
        _ => SyncMode::Full,
    }
}

pub struct EventFetcher {
    api: Arc<dyn CalendarApi>,
    connections: Arc<dyn ConnectionRepository>,
    calendar_id: String,
    lookback: Duration,
}

impl EventFetcher {
    pub fn new(
        api: Arc<dyn CalendarApi>,
        connections: Arc<dyn ConnectionRepository>,
        calendar_id: impl Into<String>,
        lookback: Duration,
    ) -> Self {
        Self { api, connections, calendar_id: calendar_id.into(), lookback }
    }

    fn base_query(&self, connection: &CalendarConnection, mode: SyncMode) -> EventsQuery {
        let (sync_token, time_min) = match mode {
            SyncMode::Incremental => (connection.sync_token.clone(), None),
            SyncMode::Full => (None, Some(Utc::now() - self.lookback)),
        };

        EventsQuery {
            calendar_id: self.calendar_id.clone(),
            sync_token,
            time_min,
            page_token: None,
            single_events: true,
        }
    }

    /// Fetch all pages for `connection`.
    ///
    /// A 410 clears the stored cursor before failing with
    /// `SyncTokenInvalid`, so the next invocation runs a full sync.
    #[instrument(skip_all, fields(connection_id = %connection.id, is_manual = is_manual))]
    pub async fn fetch(&self, connection: &CalendarConnection, is_manual: bool) -> Result<FetchOutcome> {
        let mode = select_mode(connection, is_manual);
        let mut query = self.base_query(connection, mode);
        info!(?mode, "fetching provider events");

        let mut items = Vec::new();
        let mut latest_sync_token: Option<String> = None;
        let mut seen_page_tokens = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = match self.api.list_events(&connection.access_token, &query).await {
                Ok(page) => page,
                Err(ProviderError::Gone(body)) => {
                    warn!("sync token invalid (410 GONE), clearing for full resync");
                    self.connections.clear_sync_token(&connection.id).await?;
                    return Err(CalSyncError::SyncTokenInvalid(body));
                }
                Err(err) => return Err(map_list_error(err)),
            };

            pages += 1;
            latest_sync_token = page.next_sync_token.or(latest_sync_token);
            items.extend(page.items);

            match page.next_page_token {
                Some(token) if seen_page_tokens.insert(token.clone()) => {
                    debug!(pages, "following next page");
                    query.page_token = Some(token);
                }
                Some(_) => {
                    warn!(pages, "provider repeated a page token; stopping pagination loop");
                    break;
                }
                None => break,
            }
        }

        info!(pages, items = items.len(), has_cursor = latest_sync_token.is_some(), "fetch complete");
        Ok(FetchOutcome { mode, items, next_sync_token: latest_sync_token, pages })
    }
}

fn map_list_error(err: ProviderError) -> CalSyncError {
    match err {
        ProviderError::Gone(body) => CalSyncError::SyncTokenInvalid(body),
        ProviderError::Status { status, body } => CalSyncError::UpstreamProvider { status, body },
        ProviderError::Transport(msg) => CalSyncError::Network(msg),
        other => CalSyncError::Internal(other.to_string()),
    }
}

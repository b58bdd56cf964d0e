//! Scripted calendar provider and identity verifier.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::{CalendarApi, IdentityVerifier, ProviderError};
use calsync_domain::{
    CalSyncError, EventsPage, EventsQuery, ProviderEvent, Result as DomainResult, TokenGrant,
    VerifiedUser,
};
use parking_lot::Mutex;

type PageResult = Result<EventsPage, ProviderError>;

/// Provider fake that serves queued pages in order and records every query.
#[derive(Clone)]
pub struct ScriptedCalendar {
    pages: Arc<Mutex<VecDeque<PageResult>>>,
    queries: Arc<Mutex<Vec<(String, EventsQuery)>>>,
    grant: Arc<Mutex<Result<TokenGrant, ProviderError>>>,
    pub refresh_calls: Arc<AtomicUsize>,
}

impl Default for ScriptedCalendar {
    fn default() -> Self {
        Self {
            pages: Arc::default(),
            queries: Arc::default(),
            grant: Arc::new(Mutex::new(Ok(TokenGrant {
                access_token: "access-new".into(),
                expires_in: 3600,
            }))),
            refresh_calls: Arc::default(),
        }
    }
}

impl ScriptedCalendar {
    pub fn push_page(
        &self,
        items: Vec<ProviderEvent>,
        next_page_token: Option<&str>,
        next_sync_token: Option<&str>,
    ) -> &Self {
        self.pages.lock().push_back(Ok(EventsPage {
            items,
            next_page_token: next_page_token.map(str::to_string),
            next_sync_token: next_sync_token.map(str::to_string),
        }));
        self
    }

    pub fn push_error(&self, error: ProviderError) -> &Self {
        self.pages.lock().push_back(Err(error));
        self
    }

    pub fn reject_refresh(&self, error: ProviderError) {
        *self.grant.lock() = Err(error);
    }

    pub fn grant_refresh(&self, grant: TokenGrant) {
        *self.grant.lock() = Ok(grant);
    }

    /// `(access_token, query)` for every list call, in order.
    pub fn queries(&self) -> Vec<(String, EventsQuery)> {
        self.queries.lock().clone()
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarApi for ScriptedCalendar {
    async fn list_events(&self, access_token: &str, query: &EventsQuery) -> PageResult {
        self.queries.lock().push((access_token.to_string(), query.clone()));
        self.pages.lock().pop_front().unwrap_or_else(|| Ok(EventsPage::default()))
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.grant.lock().clone()
    }
}

/// Identity provider with a fixed token table.
#[derive(Default, Clone)]
pub struct StaticIdentity {
    users: HashMap<String, VerifiedUser>,
}

impl StaticIdentity {
    pub fn with_user(mut self, token: &str, user_id: &str) -> Self {
        self.users.insert(token.into(), VerifiedUser { id: user_id.into(), email: None });
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentity {
    async fn verify(&self, bearer_token: &str) -> DomainResult<VerifiedUser> {
        self.users
            .get(bearer_token)
            .cloned()
            .ok_or_else(|| CalSyncError::Unauthorized("invalid token".into()))
    }
}

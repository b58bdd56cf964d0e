use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use calsync_api::{router, AppContext};
use calsync_domain::{
    CalendarConnection, Config, DatabaseConfig, GoogleConfig, IdentityConfig, NewCalendarConnection,
    ServerConfig,
};
use calsync_infra::SqliteConnectionRepository;
use chrono::{Duration, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::MockServer;

/// Router plus the mocked collaborators behind it.
pub struct TestApp {
    pub ctx: Arc<AppContext>,
    pub server: MockServer,
    _temp_dir: TempDir,
}

impl TestApp {
    /// Build an app against a fresh database, with Google and identity
    /// endpoints pointed at a wiremock server.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let server = MockServer::start().await;

        let mut google = GoogleConfig::new("client-id", "client-secret");
        google.token_endpoint = format!("{}/token", server.uri());
        google.api_base = format!("{}/calendar/v3", server.uri());

        let mut config = Config {
            server: ServerConfig {
                cors_allowed_origins: vec!["https://app.example.com".into()],
                ..ServerConfig::default()
            },
            database: DatabaseConfig::new(temp_dir.path().join("calsync.db").display().to_string()),
            google,
            identity: IdentityConfig {
                user_endpoint: format!("{}/auth/v1/user", server.uri()),
                api_key: Some("anon-key".into()),
            },
            sync: Default::default(),
            outbox: Default::default(),
            webhook: Default::default(),
        };
        adjust(&mut config);

        let ctx = Arc::new(AppContext::new(config).await.expect("context should build"));
        Self { ctx, server, _temp_dir: temp_dir }
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.ctx))
    }

    /// Send one request and return status plus parsed JSON body
    /// (`Value::Null` for an empty body).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.expect("router should respond");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body should be JSON")
        };
        (status, body)
    }

    /// Insert a connection owned by `user_id` with channel `chan-1` / `res-1`.
    pub async fn seed_connection(&self, user_id: &str) -> CalendarConnection {
        let repo = SqliteConnectionRepository::new(Arc::clone(&self.ctx.db));
        let created = repo
            .create(NewCalendarConnection {
                user_id: user_id.to_string(),
                provider: "google".to_string(),
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                token_expires_at: Some(Utc::now() + Duration::hours(1)),
            })
            .await
            .expect("connection should insert");
        repo.assign_channel(&created.id, "chan-1", "res-1", Some("channel-secret"))
            .await
            .expect("channel should be assigned");

        calsync_core::ConnectionRepository::find_by_id(&repo, &created.id)
            .await
            .expect("lookup succeeds")
            .expect("connection exists")
    }
}

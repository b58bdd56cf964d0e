//! Shared test helpers for `calsync-core` integration tests.
//!
//! In-memory ports and fixtures so the sync pipeline can run without a
//! database or a provider.

#![allow(dead_code)]

pub mod calendar;
pub mod logs;
pub mod repositories;

use calsync_domain::{CalendarConnection, ProviderEvent};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

/// Connection owned by `user-1`, listening on `chan-1` / `res-1`.
pub fn connection(sync_token: Option<&str>, expires_in: Duration) -> CalendarConnection {
    let now = Utc::now();
    CalendarConnection {
        id: "conn-1".into(),
        user_id: "user-1".into(),
        provider: "google".into(),
        access_token: "access-old".into(),
        refresh_token: Some("refresh-1".into()),
        token_expires_at: Some(now + expires_in),
        channel_id: Some("chan-1".into()),
        resource_id: Some("res-1".into()),
        channel_token: Some("channel-secret".into()),
        sync_token: sync_token.map(str::to_string),
        sync_token_version: 0,
        last_synced_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn fresh_connection(sync_token: Option<&str>) -> CalendarConnection {
    connection(sync_token, Duration::hours(1))
}

pub fn active_item(id: &str, start: DateTime<Utc>) -> ProviderEvent {
    let end = start + Duration::minutes(30);
    ProviderEvent::from_raw(json!({
        "id": id,
        "status": "confirmed",
        "summary": format!("Event {id}"),
        "start": { "dateTime": start.to_rfc3339() },
        "end": { "dateTime": end.to_rfc3339() },
    }))
    .unwrap()
}

pub fn cancelled_item(id: &str) -> ProviderEvent {
    ProviderEvent::from_raw(json!({ "id": id, "status": "cancelled" })).unwrap()
}

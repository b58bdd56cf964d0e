//! Provider-side shapes: event items, list pages, and token grants.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PROVIDER_STATUS_CANCELLED;

/// `start` / `end` object of a provider event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time_zone: Option<String>,
}

/// One item of the provider's events list.
///
/// Only the fields the reconciler reads are typed; the full JSON object is
/// kept in `raw` and mirrored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub id: Option<String>,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<ProviderEventTime>,
    pub end: Option<ProviderEventTime>,
    pub updated: Option<String>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl ProviderEvent {
    /// Decode an item, keeping the original object alongside the typed view.
    pub fn from_raw(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut event: Self = serde_json::from_value(raw.clone())?;
        event.raw = raw;
        Ok(event)
    }

    /// Reduced view of an item whose other fields fail to decode.
    ///
    /// Only `id` and `status` are read. Returns `None` unless the item is a
    /// cancellation with a string id, since nothing else can be applied
    /// without the typed fields.
    pub fn cancellation_from_raw(raw: serde_json::Value) -> Option<Self> {
        let id = raw.get("id")?.as_str()?.to_string();
        let status = raw.get("status")?.as_str()?;
        if status != PROVIDER_STATUS_CANCELLED {
            return None;
        }

        Some(Self {
            id: Some(id),
            status: Some(status.to_string()),
            summary: None,
            description: None,
            location: None,
            start: None,
            end: None,
            updated: None,
            raw,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some(PROVIDER_STATUS_CANCELLED)
    }
}

/// One page of the provider's events list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventsPage {
    pub items: Vec<ProviderEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// Parameters of one list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsQuery {
    pub calendar_id: String,
    pub sync_token: Option<String>,
    pub time_min: Option<DateTime<Utc>>,
    pub page_token: Option<String>,
    pub single_events: bool,
}

/// Result of a refresh-token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
}

impl TokenGrant {
    /// Absolute expiry of the grant, or `None` when `expires_in` does not fit
    /// the representable time range.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in).and_then(|lifetime| now.checked_add_signed(lifetime))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn from_raw_keeps_unknown_fields() {
        let raw = json!({
            "id": "evt-1",
            "status": "confirmed",
            "summary": "Standup",
            "start": { "dateTime": "2025-01-01T09:00:00Z" },
            "end": { "dateTime": "2025-01-01T09:15:00Z" },
            "hangoutLink": "https://meet.example/abc"
        });

        let event = ProviderEvent::from_raw(raw.clone()).unwrap();
        assert_eq!(event.id.as_deref(), Some("evt-1"));
        assert_eq!(
            event.start.as_ref().and_then(|s| s.date_time.as_deref()),
            Some("2025-01-01T09:00:00Z")
        );
        assert_eq!(event.raw["hangoutLink"], "https://meet.example/abc");
        assert!(!event.is_cancelled());
    }

    #[test]
    fn grant_expiry_is_relative_to_now() {
        let now = Utc::now();
        let grant = TokenGrant { access_token: "a".into(), expires_in: 3600 };
        assert_eq!(grant.expires_at(now), Some(now + Duration::hours(1)));
    }

    #[test]
    fn out_of_range_lifetime_has_no_expiry() {
        let now = Utc::now();
        for expires_in in [i64::MAX, i64::MIN, 1 << 50] {
            let grant = TokenGrant { access_token: "a".into(), expires_in };
            assert_eq!(grant.expires_at(now), None, "expires_in = {expires_in}");
        }
    }

    #[test]
    fn cancellation_survives_malformed_fields() {
        let raw = json!({ "id": "evt-3", "status": "cancelled", "start": 5, "summary": 42 });
        assert!(ProviderEvent::from_raw(raw.clone()).is_err());

        let event = ProviderEvent::cancellation_from_raw(raw.clone()).unwrap();
        assert!(event.is_cancelled());
        assert_eq!(event.id.as_deref(), Some("evt-3"));
        assert_eq!(event.raw, raw);

        assert!(ProviderEvent::cancellation_from_raw(json!({ "id": "evt-4", "status": "confirmed", "start": 5 }))
            .is_none());
        assert!(ProviderEvent::cancellation_from_raw(json!({ "id": 7, "status": "cancelled" })).is_none());
    }

    #[test]
    fn cancelled_items_may_omit_times() {
        let event = ProviderEvent::from_raw(json!({ "id": "evt-2", "status": "cancelled" })).unwrap();
        assert!(event.is_cancelled());
        assert!(event.start.is_none());
    }
}

//! Local mirror of provider calendar events.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CalSyncError, Result};

/// Start or end of an event: an instant, or a bare date for all-day events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl EventTime {
    /// Parse the stored TEXT form (`YYYY-MM-DD` or RFC 3339).
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::Date(date));
        }

        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Self::DateTime(dt.with_timezone(&Utc)))
            .map_err(|e| CalSyncError::BadRequest(format!("invalid event time '{value}': {e}")))
    }

    /// Render for TEXT storage; round-trips through [`EventTime::parse`].
    pub fn to_storage_string(&self) -> String {
        match self {
            Self::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
            Self::Date(date) => date.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn is_date_only(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// Upsert parameters for one mirrored event.
///
/// `(calendar_connection_id, external_id)` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCalendarEvent {
    pub calendar_connection_id: String,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: EventTime,
    pub end_time: EventTime,
    pub is_all_day: bool,
    /// Untouched provider payload kept for forward-compatibility.
    pub raw_data: serde_json::Value,
}

/// A persisted row of `calendar_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEventRow {
    pub id: String,
    pub calendar_connection_id: String,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: EventTime,
    pub end_time: EventTime,
    pub is_all_day: bool,
    pub raw_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_date_only_values() {
        let parsed = EventTime::parse("2025-03-04").unwrap();
        assert_eq!(parsed, EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()));
        assert!(parsed.is_date_only());
    }

    #[test]
    fn normalises_offsets_to_utc() {
        let parsed = EventTime::parse("2025-03-04T10:00:00+02:00").unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 8, 0, 0).unwrap();
        assert_eq!(parsed, EventTime::DateTime(expected));
        assert_eq!(parsed.to_storage_string(), "2025-03-04T08:00:00Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(EventTime::parse("tomorrow"), Err(CalSyncError::BadRequest(_))));
    }

    #[test]
    fn serde_untagged_prefers_instant_then_date() {
        let instant: EventTime = serde_json::from_str("\"2025-03-04T08:00:00Z\"").unwrap();
        assert!(!instant.is_date_only());
        let date: EventTime = serde_json::from_str("\"2025-03-04\"").unwrap();
        assert!(date.is_date_only());
    }
}

//! Sync invocation outcomes.

use serde::{Deserialize, Serialize};

/// How the fetch loop addresses the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Continue from the stored cursor.
    Incremental,
    /// Bounded time window, no cursor.
    Full,
}

/// Body of a successful sync response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub success: bool,
    pub events_synced: usize,
    pub events_deleted: usize,
}

impl SyncSummary {
    pub fn new(events_synced: usize, events_deleted: usize) -> Self {
        Self { success: true, events_synced, events_deleted }
    }
}

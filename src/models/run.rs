//! Run metadata
//!
//! Written once per run whether the connector succeeded or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a connector run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every item was extracted
    Success,
    /// The run completed but some items were skipped
    Degraded,
    /// The connector aborted
    Failure,
}

/// A single skipped item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// What was being extracted (e.g. `table analytics.events`)
    pub item: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub crawler_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub run_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Error chain of the fatal error, outermost first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub entity_count: usize,
    pub item_error_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_errors: Vec<ItemError>,
}

impl RunMetadata {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status == RunStatus::Failure
    }

    /// Wall-clock duration of the run
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

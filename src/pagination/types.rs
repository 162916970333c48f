//! Pagination types and traits
//!
//! Defines the core pagination abstractions used by all strategies.

use crate::auth::extract_path;
use serde_json::Value;

/// Result of the next page computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// More pages available; set these query parameters
    Continue { query_params: Vec<(String, String)> },
    /// No more pages
    Done,
}

impl NextPage {
    pub fn with_params(params: Vec<(String, String)>) -> Self {
        Self::Continue {
            query_params: params,
        }
    }

    pub fn with_param(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_params(vec![(key.into(), value.into())])
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Stop conditions for pagination
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StopCondition {
    /// Stop when page is empty (no records)
    #[default]
    EmptyPage,

    /// Stop when the records fetched so far reach a total reported by the API
    TotalCount {
        /// Dotted path to the total count field
        path: String,
    },
}

impl StopCondition {
    pub fn total_count(path: impl Into<String>) -> Self {
        Self::TotalCount { path: path.into() }
    }
}

/// Tracks pagination state during iteration
#[derive(Debug, Clone, Default)]
pub struct PaginationState {
    /// Current offset (for offset-based pagination)
    pub offset: u64,
    /// Current cursor value
    pub cursor: Option<String>,
    /// Total records fetched so far
    pub total_fetched: u64,
    /// Pages fetched so far
    pub pages: u32,
    pub done: bool,
}

impl PaginationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Record a fetched page
    pub fn add_page(&mut self, records: usize) {
        self.pages += 1;
        self.total_fetched += records as u64;
    }
}

/// Core trait for pagination strategies
pub trait Paginator: Send + Sync {
    /// Query parameters for the first request
    fn initial_params(&self) -> Vec<(String, String)>;

    /// Process a response and determine if there's a next page
    fn process_response(
        &self,
        body: &Value,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage;
}

/// Check a stop condition against a response
pub fn should_stop(
    condition: &StopCondition,
    body: &Value,
    records_count: usize,
    state: &PaginationState,
) -> bool {
    match condition {
        StopCondition::EmptyPage => records_count == 0,
        StopCondition::TotalCount { path } => {
            records_count == 0
                || extract_path(body, path)
                    .and_then(|s| s.parse::<u64>().ok())
                    .is_some_and(|total| state.total_fetched >= total)
        }
    }
}

//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{should_stop, NextPage, PaginationState, Paginator, StopCondition};
use crate::auth::extract_path;
use serde_json::Value;

// ============================================================================
// Cursor Pagination
// ============================================================================

/// Cursor-based pagination
///
/// Uses a token from the response to fetch the next page, e.g. Google APIs'
/// `nextPageToken` → `?pageToken=...`.
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    /// Query parameter name for cursor
    pub cursor_param: String,
    /// Dotted path of the cursor in the response
    pub cursor_path: String,
    /// Optional page size parameter and value
    pub page_size: Option<(String, u32)>,
}

impl CursorPaginator {
    pub fn new(cursor_param: impl Into<String>, cursor_path: impl Into<String>) -> Self {
        Self {
            cursor_param: cursor_param.into(),
            cursor_path: cursor_path.into(),
            page_size: None,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, param: impl Into<String>, size: u32) -> Self {
        self.page_size = Some((param.into(), size));
        self
    }

    /// Google API convention (`pageToken` / `nextPageToken` / `maxResults`)
    pub fn google(page_size: u32) -> Self {
        Self::new("pageToken", "nextPageToken").with_page_size("maxResults", page_size)
    }
}

impl Paginator for CursorPaginator {
    fn initial_params(&self) -> Vec<(String, String)> {
        self.page_size
            .iter()
            .map(|(param, size)| (param.clone(), size.to_string()))
            .collect()
    }

    fn process_response(
        &self,
        body: &Value,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_page(records_count);

        match extract_path(body, &self.cursor_path).filter(|c| !c.is_empty()) {
            // A repeated cursor would loop forever
            Some(cursor) if state.cursor.as_deref() != Some(cursor.as_str()) => {
                state.cursor = Some(cursor.clone());
                NextPage::with_param(&self.cursor_param, cursor)
            }
            _ => {
                state.mark_done();
                NextPage::Done
            }
        }
    }
}

// ============================================================================
// Offset Pagination
// ============================================================================

/// Offset-based pagination
///
/// `?offset=100&limit=50`, stopping on a short page or on the stop
/// condition (e.g. Airflow's `total_entries`).
#[derive(Debug, Clone)]
pub struct OffsetPaginator {
    pub offset_param: String,
    pub limit_param: String,
    pub limit_value: u32,
    pub stop_condition: StopCondition,
}

impl OffsetPaginator {
    pub fn new(
        offset_param: impl Into<String>,
        limit_param: impl Into<String>,
        limit_value: u32,
        stop_condition: StopCondition,
    ) -> Self {
        Self {
            offset_param: offset_param.into(),
            limit_param: limit_param.into(),
            limit_value: limit_value.max(1),
            stop_condition,
        }
    }

    fn params(&self, offset: u64) -> Vec<(String, String)> {
        vec![
            (self.offset_param.clone(), offset.to_string()),
            (self.limit_param.clone(), self.limit_value.to_string()),
        ]
    }
}

impl Paginator for OffsetPaginator {
    fn initial_params(&self) -> Vec<(String, String)> {
        self.params(0)
    }

    fn process_response(
        &self,
        body: &Value,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_page(records_count);

        if should_stop(&self.stop_condition, body, records_count, state)
            || records_count < self.limit_value as usize
        {
            state.mark_done();
            return NextPage::Done;
        }

        state.offset += u64::from(self.limit_value);
        NextPage::with_params(self.params(state.offset))
    }
}

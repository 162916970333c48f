//! Page loop
//!
//! Drives a [`Paginator`] against an [`HttpClient`] until the strategy
//! reports the last page, collecting the records found under one key of
//! each response body.

use super::types::{NextPage, PaginationState, Paginator};
use crate::error::Result;
use crate::http::{HttpClient, RequestConfig};
use serde_json::Value;
use tracing::debug;

/// Safety net against APIs that never stop returning pages
pub const DEFAULT_MAX_PAGES: u32 = 10_000;

/// Fetch every page of `path` and return the records under `records_key`.
///
/// A missing or `null` records key counts as an empty page; a body that is
/// itself an array is taken as the records when `records_key` is empty.
pub async fn collect_pages(
    client: &HttpClient,
    path: &str,
    request: RequestConfig,
    paginator: &dyn Paginator,
    records_key: &str,
) -> Result<Vec<Value>> {
    let mut state = PaginationState::new();
    let mut request = request;
    for (key, value) in paginator.initial_params() {
        request.set_query(&key, value);
    }

    let mut records = Vec::new();
    loop {
        let body: Value = client.get_json(path, request.clone()).await?;
        let page = take_records(body.clone(), records_key);
        let page_len = page.len();
        records.extend(page);

        let next = paginator.process_response(&body, page_len, &mut state);
        debug!(
            path,
            page = state.pages,
            records = page_len,
            "Fetched page"
        );

        match next {
            NextPage::Done => break,
            NextPage::Continue { query_params } => {
                if state.pages >= DEFAULT_MAX_PAGES {
                    debug!(path, "Reached page limit");
                    break;
                }
                for (key, value) in query_params {
                    request.set_query(&key, value);
                }
            }
        }
    }

    Ok(records)
}

/// Pull the record array out of a response body
pub fn take_records(body: Value, records_key: &str) -> Vec<Value> {
    let records = if records_key.is_empty() {
        body
    } else {
        match body {
            Value::Object(mut map) => map.remove(records_key).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    };

    match records {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

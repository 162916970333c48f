//! Pagination module
//!
//! Supports: Cursor (page tokens) and offset/limit.
//!
//! Each strategy extracts the next page parameters from a response body and
//! tracks when pagination is complete; [`collect_pages`] runs the loop.

mod fetch;
mod strategies;
mod types;

pub use fetch::{collect_pages, take_records, DEFAULT_MAX_PAGES};
pub use strategies::{CursorPaginator, OffsetPaginator};
pub use types::{should_stop, NextPage, PaginationState, Paginator, StopCondition};

//! Scope filters
//!
//! - [`DatasetFilter`]: include/exclude trees over database → schema → table
//! - [`PatternFilter`]: glob include/exclude over object names

mod dataset;
mod pattern;

pub use dataset::{DatabaseFilter, DatasetFilter, SchemaFilter, TableFilter};
pub use pattern::PatternFilter;

#[cfg(test)]
mod tests;

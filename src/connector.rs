//! Connector trait and per-run extraction context
//!
//! Every connector implements [`Connector`]. The driver creates one
//! [`ExtractContext`] per run and passes it into `extract()`; the context
//! collects entities emitted early and per-item failures.

use crate::error::{Error, Result};
use crate::models::{Entity, ItemError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Display;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Default number of concurrent per-item requests
pub const DEFAULT_CONCURRENCY: usize = 10;

// ============================================================================
// Connector Trait
// ============================================================================

/// Core trait that all connectors implement
#[async_trait]
pub trait Connector: Send + Sync {
    /// Name recorded in run metadata (e.g. `bigquery`)
    fn name(&self) -> &'static str;

    /// Platform label recorded in run metadata
    fn platform(&self) -> Option<String> {
        None
    }

    /// Extract every in-scope entity.
    ///
    /// Per-item failures go to [`ExtractContext::report_item_error`]; an `Err`
    /// aborts the run.
    async fn extract(&self, ctx: &ExtractContext) -> Result<Vec<Entity>>;
}

// ============================================================================
// Extract Context
// ============================================================================

/// Per-run state shared with the connector
#[derive(Debug)]
pub struct ExtractContext {
    run_name: String,
    concurrency: usize,
    emitted: Mutex<Vec<Entity>>,
    item_errors: Mutex<Vec<ItemError>>,
}

impl ExtractContext {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            concurrency: DEFAULT_CONCURRENCY,
            emitted: Mutex::new(Vec::new()),
            item_errors: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Maximum in-flight per-item requests
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Hand over a fully built entity before `extract()` returns.
    ///
    /// Emitted entities are written even when the run later fails.
    pub fn emit(&self, entity: impl Into<Entity>) {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entity.into());
    }

    /// Record a skipped item and keep going
    pub fn report_item_error(&self, item: impl Into<String>, error: impl Display) {
        let item = item.into();
        let message = error.to_string();
        warn!(item = %item, error = %message, "Skipping item");
        self.item_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ItemError { item, message });
    }

    /// Deserialize list records one by one.
    ///
    /// A malformed record becomes an item error named `"{item} {id}"` (the
    /// record's `id_key` value, or its position when that is missing) and the
    /// rest are kept.
    pub fn parse_records<T: DeserializeOwned>(
        &self,
        records: Vec<Value>,
        item: &str,
        id_key: &str,
    ) -> Vec<T> {
        records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let label = match record.get(id_key) {
                    Some(Value::String(id)) => format!("{item} {id}"),
                    Some(id @ Value::Number(_)) => format!("{item} {id}"),
                    _ => format!("{item} #{index}"),
                };
                match serde_json::from_value(record) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        self.report_item_error(label.clone(), Error::mapping(label, e.to_string()));
                        None
                    }
                }
            })
            .collect()
    }

    pub fn item_error_count(&self) -> usize {
        self.item_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Consume the context, returning emitted entities and item errors
    pub fn into_parts(self) -> (Vec<Entity>, Vec<ItemError>) {
        let emitted = self
            .emitted
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let item_errors = self
            .item_errors
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (emitted, item_errors)
    }
}

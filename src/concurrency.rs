//! Bounded fan-out
//!
//! Connectors that need one request per item (table details, DAG tasks) run
//! them through [`bounded_map`] so at most `limit` requests are in flight.

use crate::error::{Error, Result};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use tracing::warn;

/// Results of a fan-out, keyed by item name
#[derive(Debug)]
pub struct FanOut<T> {
    pub results: BTreeMap<String, T>,
    pub failures: Vec<(String, Error)>,
}

impl<T> Default for FanOut<T> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> FanOut<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `f` over every `(name, item)` pair with at most `limit` futures in flight.
///
/// Successes are collected by name; failures are returned separately so the
/// caller can report them as item errors and keep going. Names must be
/// unique: a repeated name is not run and is reported as a failure.
pub async fn bounded_map<I, T, F, Fut>(
    items: impl IntoIterator<Item = (String, I)>,
    limit: usize,
    mut f: F,
) -> FanOut<T>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut fan_out = FanOut::default();
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for (name, item) in items {
        if seen.insert(name.clone()) {
            unique.push((name, item));
        } else {
            warn!(item = %name, "Duplicate item name, skipping");
            let error = Error::mapping(name.clone(), "duplicate item name");
            fan_out.failures.push((name, error));
        }
    }

    let futures = unique.into_iter().map(|(name, item)| {
        let fut = f(item);
        async move { (name, fut.await) }
    });

    let outcomes: Vec<_> = stream::iter(futures)
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    for (name, outcome) in outcomes {
        match outcome {
            Ok(value) => {
                fan_out.results.insert(name, value);
            }
            Err(e) => fan_out.failures.push((name, e)),
        }
    }
    fan_out.failures.sort_by(|a, b| a.0.cmp(&b.0));
    fan_out
}

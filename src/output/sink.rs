//! Entity sink
//!
//! Writes a run's entities as newline-delimited JSON chunk files and its
//! run metadata as a single JSON document:
//!
//! ```text
//! {run_name}/{timestamp}/1-of-3.json
//! {run_name}/{timestamp}/2-of-3.json
//! {run_name}/{timestamp}/3-of-3.json
//! {run_name}/{timestamp}/query_logs.parquet   (optional)
//! {run_name}/{timestamp}/run.json
//! ```

use super::cloud::CloudDestination;
use super::columnar::{query_logs_to_batch, write_parquet_bytes, ParquetWriterConfig};
use crate::error::{Error, Result, ResultExt};
use crate::models::{Entity, RunMetadata};
use crate::query_log::QueryLog;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_batch_size() -> usize {
    200
}

fn default_max_file_bytes() -> usize {
    100 * 1024 * 1024
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Local directory or `s3://`, `gs://`, `az://`, `r2://` URL
    pub location: String,

    /// Maximum entities per chunk file
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum bytes per chunk file
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Also write query logs as Parquet
    #[serde(default)]
    pub query_logs_parquet: bool,
}

impl OutputConfig {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            batch_size: default_batch_size(),
            max_file_bytes: default_max_file_bytes(),
            query_logs_parquet: false,
        }
    }
}

/// Writes entities and run metadata for one run
#[derive(Debug)]
pub struct EntitySink {
    destination: CloudDestination,
    config: OutputConfig,
    timestamp: String,
}

impl EntitySink {
    pub fn new(config: OutputConfig) -> Result<Self> {
        Self::with_timestamp(config, Utc::now())
    }

    /// Sink writing under a fixed timestamp directory
    pub fn with_timestamp(config: OutputConfig, timestamp: DateTime<Utc>) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::invalid_value("output.batch_size", "must be at least 1"));
        }
        if config.max_file_bytes == 0 {
            return Err(Error::invalid_value("output.max_file_bytes", "must be at least 1"));
        }
        let destination = CloudDestination::parse(&config.location)?;
        Ok(Self {
            destination,
            config,
            timestamp: timestamp.format("%Y%m%dT%H%M%SZ").to_string(),
        })
    }

    /// Directory of this run's files, relative to the destination
    pub fn run_dir(&self, run_name: &str) -> String {
        format!("{}/{}", sanitize(run_name), self.timestamp)
    }

    /// Write entities as NDJSON chunks; returns the written locations
    pub async fn write(&self, entities: &[Entity], run_name: &str) -> Result<Vec<String>> {
        let lines = entities
            .iter()
            .map(serde_json::to_vec)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let chunks = chunk_lines(lines, self.config.batch_size, self.config.max_file_bytes);

        let dir = self.run_dir(run_name);
        let total = chunks.len();
        let mut locations = Vec::with_capacity(total + 1);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let path = format!("{dir}/{}-of-{total}.json", i + 1);
            locations.push(self.destination.write(&path, Bytes::from(chunk)).await?);
        }

        if self.config.query_logs_parquet {
            let logs: Vec<QueryLog> = entities
                .iter()
                .filter_map(Entity::as_query_logs)
                .flat_map(|batch| batch.logs.iter().cloned())
                .collect();
            if !logs.is_empty() {
                let batch = query_logs_to_batch(&logs)?;
                let data = write_parquet_bytes(&[batch], &ParquetWriterConfig::default())?;
                let path = format!("{dir}/query_logs.parquet");
                locations.push(self.destination.write(&path, data).await?);
            }
        }

        info!(
            run = run_name,
            entities = entities.len(),
            files = locations.len(),
            "Wrote entities"
        );
        Ok(locations)
    }

    /// Write `run.json` next to the entity chunks
    pub async fn write_run_metadata(&self, metadata: &RunMetadata) -> Result<String> {
        let data = serde_json::to_vec_pretty(metadata).context("Failed to serialize run metadata")?;
        let path = format!("{}/run.json", self.run_dir(&metadata.run_name));
        self.destination.write(&path, Bytes::from(data)).await
    }
}

fn sanitize(run_name: &str) -> String {
    let cleaned: String = run_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned
    }
}

/// Group serialized entities into newline-terminated chunks.
///
/// A chunk closes when it holds `batch_size` lines or when the next line
/// would push it past `max_bytes`. A single oversized line still gets its
/// own chunk.
pub(crate) fn chunk_lines(lines: Vec<Vec<u8>>, batch_size: usize, max_bytes: usize) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut count = 0;

    for line in lines {
        let needed = line.len() + 1;
        if count > 0 && (count >= batch_size || current.len() + needed > max_bytes) {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.extend_from_slice(&line);
        current.push(b'\n');
        count += 1;
    }
    if count > 0 {
        chunks.push(current);
    }
    chunks
}

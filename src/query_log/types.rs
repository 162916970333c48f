//! Query log records

use crate::models::DataPlatform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A table referenced by a query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueriedDataset {
    /// Entity id of the dataset
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
}

/// Canonical query log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLog {
    /// `{platform}:{source id}`
    pub query_id: String,
    pub platform: DataPlatform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Possibly truncated SQL
    pub sql: String,
    /// SHA-256 hex of the full SQL text
    pub sql_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
    pub start_time: DateTime<Utc>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_read: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_written: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_read: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<i64>,
    #[serde(default)]
    pub sources: Vec<QueriedDataset>,
    #[serde(default)]
    pub targets: Vec<QueriedDataset>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
}

fn default_lookback_days() -> u32 {
    1
}

fn default_max_sql_length() -> usize {
    100_000
}

fn default_logs_per_batch() -> usize {
    1000
}

/// Query log crawl settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryLogConfig {
    /// How far back to fetch logs
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Users whose queries are dropped (case-insensitive)
    #[serde(default)]
    pub excluded_usernames: Vec<String>,

    /// SQL longer than this many characters is truncated
    #[serde(default = "default_max_sql_length")]
    pub max_sql_length: usize,

    /// Logs per emitted `QueryLogs` entity
    #[serde(default = "default_logs_per_batch")]
    pub logs_per_batch: usize,
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            excluded_usernames: Vec::new(),
            max_sql_length: default_max_sql_length(),
            logs_per_batch: default_logs_per_batch(),
        }
    }
}

/// A table reference as known by the connector, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTableRef {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

impl RawTableRef {
    pub fn new(database: Option<&str>, schema: Option<&str>, table: &str) -> Self {
        Self {
            database: database.map(String::from),
            schema: schema.map(String::from),
            table: table.to_string(),
        }
    }
}

/// Connector-side intermediate record fed to [`QueryLogProcessor`]
///
/// [`QueryLogProcessor`]: super::QueryLogProcessor
#[derive(Debug, Clone, Default)]
pub struct RawQuery {
    pub id: String,
    pub sql: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub default_database: Option<String>,
    pub default_schema: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration: Option<f64>,
    pub rows_read: Option<i64>,
    pub rows_written: Option<i64>,
    pub bytes_read: Option<i64>,
    pub bytes_written: Option<i64>,
    /// Already known sources; parsed from SQL when `None`
    pub sources: Option<Vec<RawTableRef>>,
    /// Already known targets; parsed from SQL when `None`
    pub targets: Option<Vec<RawTableRef>>,
    pub query_type: Option<String>,
}

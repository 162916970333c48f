//! Output entity types
//!
//! Every connector maps vendor structures into one of the variants of
//! [`Entity`]. The enum is serialized with a `kind` tag so consumers can
//! dispatch without inspecting field shapes.

use crate::naming::{dataset_normalized_name, entity_id};
use crate::query_log::QueryLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Platforms
// ============================================================================

/// Platform hosting a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataPlatform {
    Bigquery,
    Duckdb,
    Mysql,
    Postgresql,
    Redshift,
    Snowflake,
    Sqlite,
}

impl fmt::Display for DataPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataPlatform::Bigquery => "BIGQUERY",
            DataPlatform::Duckdb => "DUCKDB",
            DataPlatform::Mysql => "MYSQL",
            DataPlatform::Postgresql => "POSTGRESQL",
            DataPlatform::Redshift => "REDSHIFT",
            DataPlatform::Snowflake => "SNOWFLAKE",
            DataPlatform::Sqlite => "SQLITE",
        };
        f.write_str(name)
    }
}

/// Platform hosting a dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DashboardPlatform {
    Metabase,
}

/// Orchestrator owning a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineType {
    Airflow,
}

// ============================================================================
// Shared
// ============================================================================

/// Where the object lives in its source system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_source: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Dataset
// ============================================================================

/// Identity of a dataset across runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetLogicalId {
    /// Normalized dotted name
    pub name: String,
    pub platform: DataPlatform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl DatasetLogicalId {
    /// Logical id for a table
    pub fn new(
        platform: DataPlatform,
        account: Option<&str>,
        database: Option<&str>,
        schema: Option<&str>,
        table: &str,
    ) -> Self {
        Self {
            name: dataset_normalized_name(database, schema, table),
            platform,
            account: account.map(str::to_lowercase),
        }
    }

    /// Deterministic entity id
    pub fn entity_id(&self) -> String {
        let account = self.account.as_deref().unwrap_or_default();
        entity_id("DATASET", &format!("{}:{account}:{}", self.platform, self.name))
    }
}

/// Database/schema/table as reported by the source (original casing)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStructure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
}

/// Kind of tabular object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    #[default]
    Table,
    View,
    MaterializedView,
    External,
}

/// One column (nested columns use dotted `field_path`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub field_path: String,
    pub field_name: String,
    pub native_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Columns plus table-level descriptive metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub fields: Vec<SchemaField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// View definition, when the object is a view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Table-level lineage edge set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetUpstream {
    /// Entity ids of upstream datasets
    pub source_datasets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub logical_id: DatasetLogicalId,
    pub structure: DatasetStructure,
    #[serde(default)]
    pub entity_type: DatasetType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<DatasetSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<DatasetStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<DatasetUpstream>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_info: Option<SourceInfo>,
}

impl Dataset {
    /// A bare dataset for a table
    pub fn new(
        platform: DataPlatform,
        account: Option<&str>,
        database: Option<&str>,
        schema: Option<&str>,
        table: &str,
    ) -> Self {
        Self {
            logical_id: DatasetLogicalId::new(platform, account, database, schema, table),
            structure: DatasetStructure {
                database: database.map(String::from),
                schema: schema.map(String::from),
                table: table.to_string(),
            },
            entity_type: DatasetType::Table,
            schema: None,
            statistics: None,
            upstream: None,
            source_info: None,
        }
    }

    pub fn entity_id(&self) -> String {
        self.logical_id.entity_id()
    }
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardLogicalId {
    pub dashboard_id: String,
    pub platform: DashboardPlatform,
}

/// Visualization kind, mapped from vendor display names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Area,
    Bar,
    Line,
    Map,
    Pie,
    Scatter,
    Table,
    Text,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub chart_type: ChartType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Whether the object is an interactive dashboard or a static report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardType {
    #[default]
    Dashboard,
    Report,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardInfo {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub charts: Vec<Chart>,
    #[serde(default)]
    pub dashboard_type: DashboardType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardUpstream {
    /// Entity ids of datasets the charts read from
    pub source_datasets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub logical_id: DashboardLogicalId,
    pub info: DashboardInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_info: Option<SourceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<DashboardUpstream>,
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineLogicalId {
    pub name: String,
    pub pipeline_type: PipelineType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTask {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub downstream_task_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<PipelineTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub logical_id: PipelineLogicalId,
    pub info: PipelineInfo,
}

// ============================================================================
// Query logs
// ============================================================================

/// A batch of query logs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryLogs {
    pub logs: Vec<QueryLog>,
}

// ============================================================================
// Entity
// ============================================================================

/// Closed set of entities a connector can produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Dataset(Dataset),
    Dashboard(Dashboard),
    Pipeline(Pipeline),
    QueryLogs(QueryLogs),
}

impl Entity {
    /// Tag used in serialized output
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Dataset(_) => "dataset",
            Entity::Dashboard(_) => "dashboard",
            Entity::Pipeline(_) => "pipeline",
            Entity::QueryLogs(_) => "query_logs",
        }
    }

    pub fn as_dataset(&self) -> Option<&Dataset> {
        match self {
            Entity::Dataset(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dashboard(&self) -> Option<&Dashboard> {
        match self {
            Entity::Dashboard(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&Pipeline> {
        match self {
            Entity::Pipeline(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_query_logs(&self) -> Option<&QueryLogs> {
        match self {
            Entity::QueryLogs(q) => Some(q),
            _ => None,
        }
    }
}

impl From<Dataset> for Entity {
    fn from(value: Dataset) -> Self {
        Entity::Dataset(value)
    }
}

impl From<Dashboard> for Entity {
    fn from(value: Dashboard) -> Self {
        Entity::Dashboard(value)
    }
}

impl From<Pipeline> for Entity {
    fn from(value: Pipeline) -> Self {
        Entity::Pipeline(value)
    }
}

impl From<QueryLogs> for Entity {
    fn from(value: QueryLogs) -> Self {
        Entity::QueryLogs(value)
    }
}

//! BigQuery connector
//!
//! Authenticates with a service account (signed JWT exchanged for an access
//! token), lists datasets and tables through the v2 REST API and fetches
//! each in-scope table's details with bounded concurrency. When a
//! `query_log` section is configured, finished query jobs from the lookback
//! window are turned into query logs.

use crate::auth::AuthConfig;
use crate::concurrency::bounded_map;
use crate::config::BigQueryConfig;
use crate::connector::{Connector, ExtractContext};
use crate::error::{Error, Result};
use crate::filter::DatasetFilter;
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::models::{
    DataPlatform, Dataset, DatasetSchema, DatasetStatistics, DatasetType, DatasetUpstream, Entity,
    SchemaField, SourceInfo,
};
use crate::pagination::{collect_pages, CursorPaginator};
use crate::query_log::{
    into_batches, sql_upstream, QueryLogConfig, QueryLogProcessor, RawQuery, RawTableRef,
    TableScope,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// OAuth scope for read-only BigQuery access
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery.readonly";

/// Extracts BigQuery datasets and query logs
#[derive(Debug)]
pub struct BigQueryConnector {
    config: BigQueryConfig,
    client: HttpClient,
    filter: DatasetFilter,
}

impl BigQueryConnector {
    /// Connector authenticating with the configured service account
    pub fn new(config: BigQueryConfig) -> Result<Self> {
        let key = config.service_account_key()?;
        let auth = AuthConfig::google_service_account(&key, &[BIGQUERY_SCOPE]);
        let http = HttpClientConfig::new(config.base_url.clone()).rate_limit(config.rate_limit.clone());
        let client = HttpClient::with_auth(http, auth)?;
        let filter = config.filter.normalize();
        Ok(Self {
            config,
            client,
            filter,
        })
    }

    fn project(&self) -> &str {
        &self.config.project_id
    }

    fn paginator(&self) -> CursorPaginator {
        CursorPaginator::google(self.config.page_size)
    }

    async fn list_datasets(&self, ctx: &ExtractContext) -> Result<Vec<String>> {
        let path = format!("/projects/{}/datasets", self.project());
        let records = collect_pages(
            &self.client,
            &path,
            RequestConfig::new(),
            &self.paginator(),
            "datasets",
        )
        .await?;
        let datasets: Vec<DatasetItem> = ctx.parse_records(records, "dataset", "id");
        Ok(datasets
            .into_iter()
            .map(|d| d.dataset_reference.dataset_id)
            .collect())
    }

    async fn list_tables(&self, ctx: &ExtractContext, dataset_id: &str) -> Result<Vec<String>> {
        let path = format!("/projects/{}/datasets/{dataset_id}/tables", self.project());
        let records = collect_pages(
            &self.client,
            &path,
            RequestConfig::new(),
            &self.paginator(),
            "tables",
        )
        .await?;
        let tables: Vec<TableItem> = ctx.parse_records(records, "table", "id");
        Ok(tables
            .into_iter()
            .map(|t| t.table_reference.table_id)
            .collect())
    }

    async fn get_table(&self, dataset_id: &str, table_id: &str) -> Result<Dataset> {
        let path = format!(
            "/projects/{}/datasets/{dataset_id}/tables/{table_id}",
            self.project()
        );
        let body: Value = self.client.get_json(&path, RequestConfig::new()).await?;
        let table: Table = serde_json::from_value(body)
            .map_err(|e| Error::mapping(format!("table {dataset_id}.{table_id}"), e.to_string()))?;
        Ok(self.map_table(table))
    }

    fn map_table(&self, table: Table) -> Dataset {
        let reference = &table.table_reference;
        let mut dataset = Dataset::new(
            DataPlatform::Bigquery,
            None,
            Some(&reference.project_id),
            Some(&reference.dataset_id),
            &reference.table_id,
        );

        dataset.entity_type = match table.table_type.as_deref() {
            Some("VIEW") => DatasetType::View,
            Some("MATERIALIZED_VIEW") => DatasetType::MaterializedView,
            Some("EXTERNAL") => DatasetType::External,
            _ => DatasetType::Table,
        };

        let view_sql = table
            .view
            .as_ref()
            .or(table.materialized_view.as_ref())
            .map(|v| v.query.clone());

        let mut fields = Vec::new();
        if let Some(schema) = &table.schema {
            flatten_fields(&schema.fields, None, &mut fields);
        }
        dataset.schema = Some(DatasetSchema {
            fields,
            description: table.description.clone(),
            sql: view_sql.clone(),
        });

        dataset.statistics = Some(DatasetStatistics {
            record_count: table.num_rows.as_deref().and_then(|n| n.parse().ok()),
            data_size_bytes: table.num_bytes.as_deref().and_then(|n| n.parse().ok()),
            last_updated: parse_millis(table.last_modified_time.as_deref()),
        });

        if let Some(sql) = &view_sql {
            let source_datasets = sql_upstream(
                sql,
                &TableScope {
                    platform: DataPlatform::Bigquery,
                    account: None,
                    default_database: Some(&reference.project_id),
                    default_schema: Some(&reference.dataset_id),
                    filter: &self.filter,
                },
            );
            if !source_datasets.is_empty() {
                dataset.upstream = Some(DatasetUpstream {
                    source_datasets,
                    transformation: Some(sql.clone()),
                });
            }
        }

        dataset.source_info = Some(SourceInfo {
            main_url: Some(format!(
                "https://console.cloud.google.com/bigquery?p={}&d={}&t={}&page=table",
                reference.project_id, reference.dataset_id, reference.table_id
            )),
            created_at_source: parse_millis(table.creation_time.as_deref()),
            last_updated: parse_millis(table.last_modified_time.as_deref()),
        });

        dataset
    }

    /// Finished query jobs from the lookback window, as `QueryLogs` batches
    async fn query_logs(&self, ctx: &ExtractContext, config: &QueryLogConfig) -> Result<Vec<Entity>> {
        let since = Utc::now() - Duration::days(i64::from(config.lookback_days));
        let request = RequestConfig::new()
            .query("allUsers", true)
            .query("projection", "full")
            .query("stateFilter", "done")
            .query("minCreationTime", since.timestamp_millis());
        let path = format!("/projects/{}/jobs", self.project());
        let records =
            collect_pages(&self.client, &path, request, &self.paginator(), "jobs").await?;

        let processor = QueryLogProcessor::new(
            DataPlatform::Bigquery,
            None,
            config.clone(),
            self.filter.clone(),
        );

        let total = records.len();
        let logs: Vec<_> = ctx
            .parse_records::<Job>(records, "job", "id")
            .into_iter()
            .filter_map(Job::into_raw_query)
            .filter_map(|raw| processor.process(raw))
            .collect();

        info!(jobs = total, logs = logs.len(), "Collected BigQuery query logs");
        Ok(into_batches(logs, config.logs_per_batch))
    }
}

#[async_trait]
impl Connector for BigQueryConnector {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn platform(&self) -> Option<String> {
        Some(DataPlatform::Bigquery.to_string())
    }

    async fn extract(&self, ctx: &ExtractContext) -> Result<Vec<Entity>> {
        let project = self.project();
        let datasets = self.list_datasets(ctx).await?;
        info!(project, datasets = datasets.len(), "Listed BigQuery datasets");

        let mut table_refs = Vec::new();
        for dataset_id in datasets {
            if !self.filter.include_schema(project, &dataset_id) {
                debug!(dataset = %dataset_id, "Dataset excluded by filter");
                continue;
            }
            match self.list_tables(ctx, &dataset_id).await {
                Ok(tables) => table_refs.extend(
                    tables
                        .into_iter()
                        .filter(|table| self.filter.include_table(project, &dataset_id, table))
                        .map(|table| (dataset_id.clone(), table)),
                ),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => ctx.report_item_error(format!("dataset {dataset_id}"), e),
            }
        }

        let fan_out = bounded_map(
            table_refs
                .into_iter()
                .map(|(dataset_id, table)| (format!("{dataset_id}.{table}"), (dataset_id, table))),
            ctx.concurrency(),
            |(dataset_id, table)| async move { self.get_table(&dataset_id, &table).await },
        )
        .await;

        for (name, error) in fan_out.failures {
            if error.is_auth() {
                return Err(error);
            }
            ctx.report_item_error(format!("table {name}"), error);
        }
        let mut entities: Vec<Entity> = fan_out.results.into_values().map(Entity::from).collect();

        if let Some(config) = &self.config.query_log {
            match self.query_logs(ctx, config).await {
                Ok(batches) => entities.extend(batches),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => ctx.report_item_error("query logs", e),
            }
        }

        Ok(entities)
    }
}

/// BigQuery reports timestamps as epoch milliseconds in strings
fn parse_millis(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
}

/// Flatten RECORD fields into dotted paths
fn flatten_fields(fields: &[TableField], parent: Option<&str>, out: &mut Vec<SchemaField>) {
    for field in fields {
        let path = match parent {
            Some(parent) => format!("{parent}.{}", field.name),
            None => field.name.clone(),
        };
        let mode = field.mode.as_deref().unwrap_or("NULLABLE");
        let native_type = if mode == "REPEATED" {
            format!("ARRAY<{}>", field.field_type)
        } else {
            field.field_type.clone()
        };
        out.push(SchemaField {
            field_path: path.clone(),
            field_name: field.name.clone(),
            native_type,
            nullable: Some(mode != "REQUIRED"),
            description: field.description.clone(),
        });
        flatten_fields(&field.fields, Some(&path), out);
    }
}

// ============================================================================
// API types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetItem {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    #[serde(default)]
    project_id: Option<String>,
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableItem {
    table_reference: TableReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    table_reference: TableReference,
    #[serde(rename = "type", default)]
    table_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    num_rows: Option<String>,
    #[serde(default)]
    num_bytes: Option<String>,
    #[serde(default)]
    creation_time: Option<String>,
    #[serde(default)]
    last_modified_time: Option<String>,
    #[serde(default)]
    view: Option<ViewDefinition>,
    #[serde(default)]
    materialized_view: Option<ViewDefinition>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct TableField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct ViewDefinition {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    #[serde(default, rename = "user_email")]
    user_email: Option<String>,
    #[serde(default)]
    configuration: JobConfiguration,
    #[serde(default)]
    statistics: JobStatistics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct JobConfiguration {
    #[serde(default)]
    query: Option<QueryConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryConfiguration {
    query: String,
    #[serde(default)]
    default_dataset: Option<DatasetReference>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatistics {
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    total_bytes_processed: Option<String>,
    #[serde(default)]
    query: Option<QueryStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryStatistics {
    #[serde(default)]
    statement_type: Option<String>,
    #[serde(default)]
    referenced_tables: Option<Vec<TableReference>>,
    #[serde(default)]
    num_dml_affected_rows: Option<String>,
}

impl Job {
    /// `None` for non-query jobs (loads, extracts, copies)
    fn into_raw_query(self) -> Option<RawQuery> {
        let query = self.configuration.query?;
        let stats = self.statistics;
        let start_time = parse_millis(stats.start_time.as_deref())?;
        let duration = parse_millis(stats.end_time.as_deref())
            .map(|end| (end - start_time).num_milliseconds() as f64 / 1000.0);
        let query_stats = stats.query;

        let sources = query_stats
            .as_ref()
            .and_then(|q| q.referenced_tables.as_ref())
            .map(|tables| {
                tables
                    .iter()
                    .map(|t| RawTableRef::new(Some(&t.project_id), Some(&t.dataset_id), &t.table_id))
                    .collect()
            });

        let (default_database, default_schema) = match query.default_dataset {
            Some(dataset) => (dataset.project_id, Some(dataset.dataset_id)),
            None => (None, None),
        };

        Some(RawQuery {
            id: self.job_reference.job_id,
            sql: query.query,
            user_id: self.user_email.clone(),
            email: self.user_email,
            default_database,
            default_schema,
            start_time,
            duration,
            rows_read: None,
            rows_written: query_stats
                .as_ref()
                .and_then(|q| q.num_dml_affected_rows.as_deref())
                .and_then(|n| n.parse().ok()),
            bytes_read: stats.total_bytes_processed.and_then(|n| n.parse().ok()),
            bytes_written: None,
            sources,
            targets: None,
            query_type: query_stats.and_then(|q| q.statement_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_fields() {
        let fields: Vec<TableField> = serde_json::from_value(json!([
            {"name": "id", "type": "INTEGER", "mode": "REQUIRED"},
            {"name": "address", "type": "RECORD", "fields": [
                {"name": "city", "type": "STRING", "description": "City name"}
            ]},
            {"name": "tags", "type": "STRING", "mode": "REPEATED"}
        ]))
        .unwrap();
        let mut out = Vec::new();
        flatten_fields(&fields, None, &mut out);

        let paths: Vec<_> = out.iter().map(|f| f.field_path.as_str()).collect();
        assert_eq!(paths, vec!["id", "address", "address.city", "tags"]);
        assert_eq!(out[0].nullable, Some(false));
        assert_eq!(out[2].description.as_deref(), Some("City name"));
        assert_eq!(out[3].native_type, "ARRAY<STRING>");
    }

    #[test]
    fn test_job_into_raw_query() {
        let job: Job = serde_json::from_value(json!({
            "id": "acme:US.job_1",
            "jobReference": {"projectId": "acme", "jobId": "job_1", "location": "US"},
            "user_email": "ana@acme.com",
            "configuration": {"query": {
                "query": "INSERT INTO sales.daily SELECT * FROM sales.orders",
                "defaultDataset": {"projectId": "acme", "datasetId": "sales"}
            }},
            "statistics": {
                "creationTime": "1714564800000",
                "startTime": "1714564800000",
                "endTime": "1714564802500",
                "totalBytesProcessed": "2048",
                "query": {"statementType": "INSERT", "numDmlAffectedRows": "10",
                          "referencedTables": [{"projectId": "acme", "datasetId": "sales", "tableId": "orders"}]}
            }
        }))
        .unwrap();

        let raw = job.into_raw_query().unwrap();
        assert_eq!(raw.id, "job_1");
        assert_eq!(raw.duration, Some(2.5));
        assert_eq!(raw.bytes_read, Some(2048));
        assert_eq!(raw.rows_written, Some(10));
        assert_eq!(raw.default_database.as_deref(), Some("acme"));
        assert_eq!(raw.sources.unwrap(), vec![RawTableRef::new(Some("acme"), Some("sales"), "orders")]);
        assert!(raw.targets.is_none());
        assert_eq!(raw.query_type.as_deref(), Some("INSERT"));
    }

    #[test]
    fn test_non_query_job_is_skipped() {
        let job: Job = serde_json::from_value(json!({
            "jobReference": {"jobId": "load_1"},
            "configuration": {"load": {}},
            "statistics": {"startTime": "1714564800000"}
        }))
        .unwrap();
        assert!(job.into_raw_query().is_none());
    }
}

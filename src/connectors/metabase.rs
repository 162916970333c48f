//! Metabase connector
//!
//! Logs in with a session token, loads the database and table catalog,
//! then fetches every in-scope dashboard with its cards. Dashboard lineage
//! comes from two places: native SQL cards (parsed in the card database's
//! dialect) and structured queries' source and join tables.

use crate::auth::{AuthConfig, SessionLogin};
use crate::concurrency::bounded_map;
use crate::config::MetabaseConfig;
use crate::connector::{Connector, ExtractContext};
use crate::error::{Error, Result};
use crate::filter::DatasetFilter;
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::models::{
    Chart, ChartType, Dashboard, DashboardInfo, DashboardLogicalId, DashboardPlatform,
    DashboardType, DashboardUpstream, DataPlatform, DatasetLogicalId, Entity, SourceInfo,
};
use crate::query_log::{sql_upstream, TableScope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Metabase sessions last two weeks unless configured otherwise
const SESSION_LIFETIME_SECONDS: i64 = 14 * 24 * 3600;

/// Extracts Metabase dashboards
#[derive(Debug)]
pub struct MetabaseConnector {
    config: MetabaseConfig,
    client: HttpClient,
    filter: DatasetFilter,
}

impl MetabaseConnector {
    pub fn new(config: MetabaseConfig) -> Result<Self> {
        let base = config.url.trim_end_matches('/').to_string();
        let auth = AuthConfig::Session(SessionLogin {
            login_url: format!("{base}/api/session"),
            credentials: HashMap::from([
                ("username".to_string(), config.username.clone()),
                ("password".to_string(), config.password.clone()),
            ]),
            token_path: "id".to_string(),
            header: "X-Metabase-Session".to_string(),
            lifetime_seconds: Some(SESSION_LIFETIME_SECONDS),
        });
        let http = HttpClientConfig::new(base).rate_limit(config.rate_limit.clone());
        let client = HttpClient::with_auth(http, auth)?;
        let filter = config.filter.normalize();
        Ok(Self {
            config,
            client,
            filter,
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    async fn catalog(&self, ctx: &ExtractContext) -> Result<Catalog> {
        let body: Value = self.client.get_json("/api/database", RequestConfig::new()).await?;
        let databases: Vec<MetabaseDatabase> = ctx.parse_records(list_records(body), "database", "id");

        let body: Value = self.client.get_json("/api/table", RequestConfig::new()).await?;
        let tables: Vec<MetabaseTable> = ctx.parse_records(list_records(body), "table", "id");

        Ok(Catalog {
            databases: databases.into_iter().map(|d| (d.id, d)).collect(),
            tables: tables.into_iter().map(|t| (t.id, t)).collect(),
        })
    }

    async fn dashboard_detail(&self, id: i64) -> Result<DashboardDetail> {
        let body: Value = self
            .client
            .get_json(&format!("/api/dashboard/{id}"), RequestConfig::new())
            .await?;
        serde_json::from_value(body).map_err(|e| Error::mapping(format!("dashboard {id}"), e.to_string()))
    }

    fn map_dashboard(&self, detail: DashboardDetail, catalog: &Catalog) -> Dashboard {
        let mut charts = Vec::new();
        let mut upstream = BTreeSet::new();

        for card in detail.dashcards.into_iter().filter_map(|dashcard| dashcard.card) {
            let Some(card_id) = card.id else {
                continue;
            };
            if let Some(query) = &card.dataset_query {
                upstream.extend(self.card_upstream(query, catalog));
            }
            charts.push(Chart {
                id: card_id.to_string(),
                title: card.name.unwrap_or_else(|| format!("Card {card_id}")),
                description: card.description,
                chart_type: chart_type(card.display.as_deref()),
                url: Some(format!("{}/question/{card_id}", self.base_url())),
            });
        }

        Dashboard {
            logical_id: DashboardLogicalId {
                dashboard_id: detail.id.to_string(),
                platform: DashboardPlatform::Metabase,
            },
            info: DashboardInfo {
                title: detail.name,
                description: detail.description,
                charts,
                dashboard_type: DashboardType::Dashboard,
            },
            source_info: Some(SourceInfo {
                main_url: Some(format!("{}/dashboard/{}", self.base_url(), detail.id)),
                created_at_source: detail.created_at,
                last_updated: detail.updated_at,
            }),
            upstream: (!upstream.is_empty()).then(|| DashboardUpstream {
                source_datasets: upstream.into_iter().collect(),
            }),
        }
    }

    /// Dataset ids a card reads from
    fn card_upstream(&self, query: &DatasetQuery, catalog: &Catalog) -> Vec<String> {
        let Some(database) = query.database.and_then(|id| catalog.databases.get(&id)) else {
            return Vec::new();
        };
        let Some(platform) = database.platform() else {
            debug!(engine = %database.engine, "No lineage for database engine");
            return Vec::new();
        };
        let db_name = database.catalog_name();

        if let Some(sql) = query.native.as_ref().and_then(|n| n.query.as_deref()) {
            return sql_upstream(
                sql,
                &TableScope {
                    platform,
                    account: None,
                    default_database: Some(db_name),
                    default_schema: default_schema(platform),
                    filter: &self.filter,
                },
            );
        }

        let Some(structured) = &query.query else {
            return Vec::new();
        };
        structured
            .table_ids()
            .filter_map(|table_id| catalog.tables.get(&table_id))
            .filter(|table| {
                self.filter.include_table(
                    db_name,
                    table.schema.as_deref().unwrap_or_default(),
                    &table.name,
                )
            })
            .map(|table| {
                DatasetLogicalId::new(platform, None, Some(db_name), table.schema.as_deref(), &table.name)
                    .entity_id()
            })
            .collect()
    }
}

#[async_trait]
impl Connector for MetabaseConnector {
    fn name(&self) -> &'static str {
        "metabase"
    }

    async fn extract(&self, ctx: &ExtractContext) -> Result<Vec<Entity>> {
        let catalog = self.catalog(ctx).await?;

        let body: Value = self.client.get_json("/api/dashboard", RequestConfig::new()).await?;
        let summaries: Vec<DashboardSummary> = ctx.parse_records(list_records(body), "dashboard", "id");
        let total = summaries.len();
        let in_scope: Vec<_> = summaries
            .into_iter()
            .filter(|d| !d.archived && self.config.dashboard_filter.matches(&d.name))
            .collect();
        info!(
            dashboards = total,
            in_scope = in_scope.len(),
            databases = catalog.databases.len(),
            tables = catalog.tables.len(),
            "Listed Metabase dashboards"
        );

        let fan_out = bounded_map(
            in_scope
                .into_iter()
                .map(|d| (format!("dashboard {} ({})", d.id, d.name), d.id)),
            ctx.concurrency(),
            |id| self.dashboard_detail(id),
        )
        .await;

        for (name, error) in fan_out.failures {
            if error.is_auth() {
                return Err(error);
            }
            ctx.report_item_error(name, error);
        }

        Ok(fan_out
            .results
            .into_values()
            .map(|detail| Entity::from(self.map_dashboard(detail, &catalog)))
            .collect())
    }
}

/// List endpoints return either a bare array or `{"data": [...]}` by version
fn list_records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Schema unqualified names resolve to on a fresh connection
fn default_schema(platform: DataPlatform) -> Option<&'static str> {
    match platform {
        DataPlatform::Postgresql | DataPlatform::Redshift => Some("public"),
        DataPlatform::Duckdb | DataPlatform::Sqlite => Some("main"),
        _ => None,
    }
}

fn chart_type(display: Option<&str>) -> ChartType {
    match display.unwrap_or_default() {
        "bar" | "row" | "waterfall" | "combo" => ChartType::Bar,
        "line" => ChartType::Line,
        "area" => ChartType::Area,
        "pie" => ChartType::Pie,
        "scatter" => ChartType::Scatter,
        "table" | "pivot" | "object" => ChartType::Table,
        "map" => ChartType::Map,
        "text" | "heading" => ChartType::Text,
        _ => ChartType::Other,
    }
}

// ============================================================================
// API types
// ============================================================================

struct Catalog {
    databases: HashMap<i64, MetabaseDatabase>,
    tables: HashMap<i64, MetabaseTable>,
}

#[derive(Debug, Deserialize)]
struct MetabaseDatabase {
    id: i64,
    name: String,
    engine: String,
    #[serde(default)]
    details: HashMap<String, Value>,
}

impl MetabaseDatabase {
    fn platform(&self) -> Option<DataPlatform> {
        match self.engine.as_str() {
            "postgres" => Some(DataPlatform::Postgresql),
            "mysql" => Some(DataPlatform::Mysql),
            "bigquery-cloud-sdk" | "bigquery" => Some(DataPlatform::Bigquery),
            "snowflake" => Some(DataPlatform::Snowflake),
            "redshift" => Some(DataPlatform::Redshift),
            "sqlite" => Some(DataPlatform::Sqlite),
            "duckdb" => Some(DataPlatform::Duckdb),
            _ => None,
        }
    }

    /// Name of the warehouse database behind this connection
    fn catalog_name(&self) -> &str {
        ["dbname", "db", "project-id"]
            .iter()
            .find_map(|key| self.details.get(*key).and_then(Value::as_str))
            .unwrap_or(self.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct MetabaseTable {
    id: i64,
    name: String,
    #[serde(default)]
    schema: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DashboardSummary {
    id: i64,
    name: String,
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
struct DashboardDetail {
    id: i64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "ordered_cards")]
    dashcards: Vec<DashCard>,
}

#[derive(Debug, Deserialize)]
struct DashCard {
    #[serde(default)]
    card: Option<Card>,
}

#[derive(Debug, Deserialize)]
struct Card {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    display: Option<String>,
    #[serde(default)]
    dataset_query: Option<DatasetQuery>,
}

#[derive(Debug, Deserialize)]
struct DatasetQuery {
    #[serde(default)]
    database: Option<i64>,
    #[serde(default)]
    native: Option<NativeQuery>,
    #[serde(default)]
    query: Option<StructuredQuery>,
}

#[derive(Debug, Deserialize)]
struct NativeQuery {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StructuredQuery {
    #[serde(default, rename = "source-table")]
    source_table: Option<Value>,
    #[serde(default)]
    joins: Vec<StructuredJoin>,
}

#[derive(Debug, Deserialize)]
struct StructuredJoin {
    #[serde(default, rename = "source-table")]
    source_table: Option<Value>,
}

impl StructuredQuery {
    /// Numeric table ids; `card__N` references to other questions are skipped
    fn table_ids(&self) -> impl Iterator<Item = i64> + '_ {
        std::iter::once(&self.source_table)
            .chain(self.joins.iter().map(|join| &join.source_table))
            .filter_map(|table| table.as_ref().and_then(Value::as_i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chart_type() {
        assert_eq!(chart_type(Some("row")), ChartType::Bar);
        assert_eq!(chart_type(Some("pivot")), ChartType::Table);
        assert_eq!(chart_type(Some("funnel")), ChartType::Other);
        assert_eq!(chart_type(None), ChartType::Other);
    }

    #[test]
    fn test_list_record_shapes() {
        let bare = list_records(json!([{"id": 1, "name": "a"}]));
        let wrapped = list_records(json!({"data": [{"id": 2, "name": "b"}], "total": 1}));
        assert_eq!(bare[0]["id"], 1);
        assert_eq!(wrapped[0]["id"], 2);
        assert!(list_records(json!({"total": 0})).is_empty());
    }

    #[test]
    fn test_structured_query_table_ids() {
        let query: StructuredQuery = serde_json::from_value(json!({
            "source-table": 5,
            "joins": [{"source-table": 7}, {"source-table": "card__12"}]
        }))
        .unwrap();
        assert_eq!(query.table_ids().collect::<Vec<_>>(), vec![5, 7]);
    }

    #[test]
    fn test_database_catalog_name() {
        let db: MetabaseDatabase = serde_json::from_value(json!({
            "id": 1, "name": "Warehouse", "engine": "bigquery-cloud-sdk",
            "details": {"project-id": "acme-analytics"}
        }))
        .unwrap();
        assert_eq!(db.catalog_name(), "acme-analytics");
        assert_eq!(db.platform(), Some(DataPlatform::Bigquery));
    }
}

//! Built-in connectors
//!
//! One module per external system. [`build_connector`] turns a validated
//! [`SourceConfig`] into a ready-to-run [`Connector`].

mod airflow;
mod bigquery;
mod database;
mod metabase;

pub use airflow::AirflowConnector;
pub use bigquery::BigQueryConnector;
pub use database::DatabaseConnector;
pub use metabase::MetabaseConnector;

use crate::config::SourceConfig;
use crate::connector::Connector;
use crate::error::Result;

/// Connector metadata for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorInfo {
    /// Value of `source.type`
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    /// Entity kinds the connector produces
    pub entities: &'static [&'static str],
}

/// Every built-in connector
pub fn list_connectors() -> Vec<ConnectorInfo> {
    vec![
        ConnectorInfo {
            name: "bigquery",
            description: "BigQuery datasets, tables, views and query logs",
            category: "Warehouse",
            entities: &["dataset", "query_logs"],
        },
        ConnectorInfo {
            name: "database",
            description: "PostgreSQL, MySQL, SQLite and DuckDB catalogs via DuckDB",
            category: "Database",
            entities: &["dataset"],
        },
        ConnectorInfo {
            name: "metabase",
            description: "Metabase dashboards and cards with table lineage",
            category: "BI",
            entities: &["dashboard"],
        },
        ConnectorInfo {
            name: "airflow",
            description: "Airflow DAGs and tasks",
            category: "Orchestration",
            entities: &["pipeline"],
        },
    ]
}

/// Names of every built-in connector
pub fn list_builtin() -> Vec<&'static str> {
    list_connectors().into_iter().map(|info| info.name).collect()
}

/// Build the connector for a source configuration
pub fn build_connector(source: &SourceConfig) -> Result<Box<dyn Connector>> {
    Ok(match source {
        SourceConfig::Bigquery(config) => Box::new(BigQueryConnector::new(config.clone())?),
        SourceConfig::Database(config) => Box::new(DatabaseConnector::new(config.clone())),
        SourceConfig::Metabase(config) => Box::new(MetabaseConnector::new(config.clone())?),
        SourceConfig::Airflow(config) => Box::new(AirflowConnector::new(config.clone())?),
    })
}

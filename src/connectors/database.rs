//! Relational database connector
//!
//! Reads a PostgreSQL, MySQL, SQLite or DuckDB catalog through DuckDB and
//! maps each in-scope table and view to a dataset. System schemas are always
//! excluded. View definitions are parsed for upstream lineage.

use crate::config::DatabaseConfig;
use crate::connector::{Connector, ExtractContext};
use crate::database::{default_exclusions, CatalogReader, CatalogTable};
use crate::error::{Error, Result};
use crate::filter::DatasetFilter;
use crate::models::{
    DataPlatform, Dataset, DatasetSchema, DatasetStatistics, DatasetUpstream, Entity, SchemaField,
};
use crate::query_log::{sql_upstream, TableScope};
use async_trait::async_trait;
use tracing::{debug, info};

/// Extracts tables and views from a relational database
#[derive(Debug, Clone)]
pub struct DatabaseConnector {
    config: DatabaseConfig,
}

impl DatabaseConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn platform_kind(&self) -> DataPlatform {
        self.config.platform.platform()
    }

    /// User filter plus the engine's system schemas
    fn effective_filter(&self, catalog: &str) -> DatasetFilter {
        self.config
            .filter
            .normalize()
            .merge(&default_exclusions(self.config.platform, catalog))
    }

    fn map_table(&self, catalog: &str, table: CatalogTable, filter: &DatasetFilter) -> Dataset {
        let platform = self.platform_kind();
        let account = self.config.account.as_deref();
        let mut dataset = Dataset::new(platform, account, Some(catalog), Some(&table.schema), &table.name);
        dataset.entity_type = table.table_type;

        let fields = table
            .columns
            .into_iter()
            .map(|column| SchemaField {
                field_path: column.name.clone(),
                field_name: column.name,
                native_type: column.data_type,
                nullable: column.nullable,
                description: column.comment,
            })
            .collect();

        if let Some(sql) = &table.view_sql {
            let source_datasets = sql_upstream(
                sql,
                &TableScope {
                    platform,
                    account,
                    default_database: Some(catalog),
                    default_schema: Some(&table.schema),
                    filter,
                },
            );
            if !source_datasets.is_empty() {
                dataset.upstream = Some(DatasetUpstream {
                    source_datasets,
                    transformation: Some(sql.clone()),
                });
            }
        }

        dataset.schema = Some(DatasetSchema {
            fields,
            description: table.comment,
            sql: table.view_sql,
        });
        if table.estimated_rows.is_some() {
            dataset.statistics = Some(DatasetStatistics {
                record_count: table.estimated_rows,
                ..Default::default()
            });
        }
        dataset
    }
}

#[async_trait]
impl Connector for DatabaseConnector {
    fn name(&self) -> &'static str {
        "database"
    }

    fn platform(&self) -> Option<String> {
        Some(self.platform_kind().to_string())
    }

    async fn extract(&self, _ctx: &ExtractContext) -> Result<Vec<Entity>> {
        let config = self.config.clone();
        let (catalog, tables) = tokio::task::spawn_blocking(move || {
            let reader = CatalogReader::open(&config)?;
            let tables = reader.read_tables()?;
            Ok::<_, Error>((reader.catalog().to_string(), tables))
        })
        .await
        .map_err(|e| Error::Other(format!("Catalog reader task failed: {e}")))??;

        let filter = self.effective_filter(&catalog);
        let total = tables.len();
        let entities: Vec<Entity> = tables
            .into_iter()
            .filter(|table| {
                let included = filter.include_table(&catalog, &table.schema, &table.name);
                if !included {
                    debug!(schema = %table.schema, table = %table.name, "Table excluded by filter");
                }
                included
            })
            .map(|table| Entity::from(self.map_table(&catalog, table, &filter)))
            .collect();

        info!(catalog = %catalog, tables = total, datasets = entities.len(), "Read database catalog");
        Ok(entities)
    }
}

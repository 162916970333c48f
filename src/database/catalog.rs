//! DuckDB-based catalog reader
//!
//! Attaches PostgreSQL, MySQL, SQLite or DuckDB databases read-only to an
//! in-memory DuckDB and reads their catalog through `information_schema`,
//! supplemented by DuckDB's `duckdb_tables()` / `duckdb_views()` for
//! comments, size estimates and view definitions.
//!
//! Everything here is blocking; callers run it on `spawn_blocking`.

use crate::config::{DatabaseConfig, DatabaseKind};
use crate::error::{Error, Result};
use crate::filter::{DatabaseFilter, DatasetFilter, SchemaFilter};
use crate::models::DatasetType;
use duckdb::{params, Connection};
use std::collections::HashMap;
use tracing::debug;

/// One column as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: Option<bool>,
    pub comment: Option<String>,
}

/// One table or view as reported by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogTable {
    pub schema: String,
    pub name: String,
    pub table_type: DatasetType,
    pub columns: Vec<CatalogColumn>,
    pub comment: Option<String>,
    /// `CREATE VIEW` statement, for views
    pub view_sql: Option<String>,
    pub estimated_rows: Option<i64>,
}

/// Read-only view of one attached database's catalog
pub struct CatalogReader {
    conn: Connection,
    kind: DatabaseKind,
    catalog: String,
}

impl CatalogReader {
    /// Attach the configured database to a fresh in-memory DuckDB
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;

        let reader = Self {
            conn,
            kind: config.platform,
            catalog: config.catalog_name()?,
        };
        reader.attach(&config.connection_target()?)?;
        Ok(reader)
    }

    /// Name the attached database is known by
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    fn attach(&self, target: &str) -> Result<()> {
        let extension = match self.kind {
            DatabaseKind::Postgresql => Some("postgres"),
            DatabaseKind::Mysql => Some("mysql"),
            DatabaseKind::Sqlite => Some("sqlite"),
            DatabaseKind::Duckdb => None,
        };

        let options = match extension {
            Some(ext) => {
                self.conn
                    .execute_batch(&format!("INSTALL {ext}; LOAD {ext};"))
                    .map_err(|e| Error::config(format!("Failed to load {ext} extension: {e}")))?;
                format!("TYPE {}, READ_ONLY", ext.to_uppercase())
            }
            None => "READ_ONLY".to_string(),
        };

        let attach_sql = format!(
            "ATTACH '{}' AS {} ({options});",
            target.replace('\'', "''"),
            quote_ident(&self.catalog)
        );
        self.conn
            .execute_batch(&attach_sql)
            .map_err(|e| Error::config(format!("Failed to attach {} database: {e}", self.catalog)))?;

        debug!(catalog = %self.catalog, kind = ?self.kind, "Attached database");
        Ok(())
    }

    /// Read every table and view in the attached catalog, with columns
    pub fn read_tables(&self) -> Result<Vec<CatalogTable>> {
        let mut tables = self.list_tables()?;
        let mut columns = self.list_columns()?;
        let details = self.table_details()?;
        let views = self.view_definitions()?;

        for table in &mut tables {
            let key = (table.schema.clone(), table.name.clone());
            table.columns = columns.remove(&key).unwrap_or_default();
            if let Some((comment, rows)) = details.get(&key) {
                table.comment.clone_from(comment);
                table.estimated_rows = *rows;
            }
            if let Some((sql, comment)) = views.get(&key) {
                table.view_sql.clone_from(sql);
                if table.comment.is_none() {
                    table.comment.clone_from(comment);
                }
            }
        }

        debug!(catalog = %self.catalog, tables = tables.len(), "Read catalog");
        Ok(tables)
    }

    fn list_tables(&self) -> Result<Vec<CatalogTable>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_schema, table_name, table_type
             FROM information_schema.tables
             WHERE table_catalog = ?
             ORDER BY table_schema, table_name",
        )?;
        let rows = stmt.query_map(params![self.catalog], |row| {
            let table_type: String = row.get(2)?;
            Ok(CatalogTable {
                schema: row.get(0)?,
                name: row.get(1)?,
                table_type: dataset_type(&table_type),
                columns: Vec::new(),
                comment: None,
                view_sql: None,
                estimated_rows: None,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn list_columns(&self) -> Result<HashMap<(String, String), Vec<CatalogColumn>>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_schema, table_name, column_name, data_type, is_nullable, column_comment
             FROM information_schema.columns
             WHERE table_catalog = ?
             ORDER BY table_schema, table_name, ordinal_position",
        )?;
        let rows = stmt.query_map(params![self.catalog], |row| {
            let nullable: Option<String> = row.get(4)?;
            Ok((
                (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                CatalogColumn {
                    name: row.get(2)?,
                    data_type: row.get(3)?,
                    nullable: nullable.map(|n| n.eq_ignore_ascii_case("YES")),
                    comment: row.get(5)?,
                },
            ))
        })?;

        let mut columns: HashMap<_, Vec<_>> = HashMap::new();
        for row in rows {
            let (key, column) = row?;
            columns.entry(key).or_default().push(column);
        }
        Ok(columns)
    }

    /// Comment and estimated row count per table
    fn table_details(&self) -> Result<HashMap<(String, String), (Option<String>, Option<i64>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT schema_name, table_name, comment, estimated_size
             FROM duckdb_tables()
             WHERE database_name = ? AND NOT internal",
        )?;
        let rows = stmt.query_map(params![self.catalog], |row| {
            Ok((
                (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                (row.get::<_, Option<String>>(2)?, row.get::<_, Option<i64>>(3)?),
            ))
        })?;
        Ok(rows.collect::<std::result::Result<HashMap<_, _>, _>>()?)
    }

    /// View SQL and comment per view
    fn view_definitions(&self) -> Result<HashMap<(String, String), (Option<String>, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT schema_name, view_name, sql, comment
             FROM duckdb_views()
             WHERE database_name = ? AND NOT internal",
        )?;
        let rows = stmt.query_map(params![self.catalog], |row| {
            Ok((
                (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                (row.get::<_, Option<String>>(2)?, row.get::<_, Option<String>>(3)?),
            ))
        })?;
        Ok(rows.collect::<std::result::Result<HashMap<_, _>, _>>()?)
    }
}

impl std::fmt::Debug for CatalogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogReader")
            .field("kind", &self.kind)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

/// System schemas that are never extracted, for the given engine
pub fn system_schemas(kind: DatabaseKind) -> &'static [&'static str] {
    match kind {
        DatabaseKind::Postgresql => &["information_schema", "pg_catalog", "pg_toast"],
        DatabaseKind::Mysql => &["information_schema", "mysql", "performance_schema", "sys"],
        DatabaseKind::Sqlite | DatabaseKind::Duckdb => &["information_schema", "pg_catalog"],
    }
}

/// Exclusion filter covering the engine's system schemas in `catalog`
pub fn default_exclusions(kind: DatabaseKind, catalog: &str) -> DatasetFilter {
    let schemas: SchemaFilter = system_schemas(kind)
        .iter()
        .map(|schema| ((*schema).to_string(), None))
        .collect();
    let mut excludes = DatabaseFilter::new();
    excludes.insert(catalog.to_string(), Some(schemas));
    DatasetFilter::excluding(excludes)
}

fn dataset_type(table_type: &str) -> DatasetType {
    match table_type.to_uppercase().as_str() {
        "VIEW" => DatasetType::View,
        "MATERIALIZED VIEW" => DatasetType::MaterializedView,
        "FOREIGN" | "FOREIGN TABLE" | "EXTERNAL" => DatasetType::External,
        _ => DatasetType::Table,
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

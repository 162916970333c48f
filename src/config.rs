//! Run configuration
//!
//! One YAML file describes a run: the source to crawl, where the output
//! goes and a few run settings. `${VAR}` references are substituted from
//! the environment before parsing, then [`RunConfig::validate`] checks what
//! serde cannot.
//!
//! ```yaml
//! run_name: warehouse-nightly
//! source:
//!   type: bigquery
//!   project_id: acme-analytics
//!   credentials_file: ${GOOGLE_APPLICATION_CREDENTIALS}
//!   filter:
//!     excludes:
//!       acme-analytics:
//!         scratch: ~
//! output:
//!   location: s3://metadata/crawls
//! ```

use crate::auth::ServiceAccountKey;
use crate::error::{Error, Result};
use crate::filter::{DatasetFilter, PatternFilter};
use crate::http::RateLimiterConfig;
use crate::models::DataPlatform;
use crate::output::OutputConfig;
use crate::query_log::QueryLogConfig;
use crate::template;
use serde::Deserialize;
use std::fs;
use std::path::Path;

// ============================================================================
// Top-Level Run Config
// ============================================================================

/// Complete run configuration loaded from YAML
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Name of the run; defaults to the source type
    #[serde(default)]
    pub run_name: Option<String>,

    /// What to crawl
    pub source: SourceConfig,

    /// Where to write entities and run metadata
    pub output: OutputConfig,

    /// Maximum in-flight per-item requests
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl RunConfig {
    /// Effective run name
    pub fn run_name(&self) -> String {
        self.run_name
            .clone()
            .unwrap_or_else(|| self.source.kind().to_string())
    }

    /// Semantic checks that deserialization cannot express
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.run_name {
            if name.trim().is_empty() {
                return Err(Error::invalid_value("run_name", "cannot be empty"));
            }
        }
        if self.concurrency == Some(0) {
            return Err(Error::invalid_value("concurrency", "must be at least 1"));
        }
        if self.output.location.trim().is_empty() {
            return Err(Error::missing_field("output.location"));
        }
        if self.output.batch_size == 0 {
            return Err(Error::invalid_value("output.batch_size", "must be at least 1"));
        }
        if self.output.max_file_bytes == 0 {
            return Err(Error::invalid_value("output.max_file_bytes", "must be at least 1"));
        }
        self.source.validate()
    }
}

// ============================================================================
// Source Config
// ============================================================================

/// Connector-specific settings, selected by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Bigquery(BigQueryConfig),
    Database(DatabaseConfig),
    Metabase(MetabaseConfig),
    Airflow(AirflowConfig),
}

impl SourceConfig {
    /// Connector name for this source
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Bigquery(_) => "bigquery",
            SourceConfig::Database(_) => "database",
            SourceConfig::Metabase(_) => "metabase",
            SourceConfig::Airflow(_) => "airflow",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SourceConfig::Bigquery(config) => config.validate(),
            SourceConfig::Database(config) => config.validate(),
            SourceConfig::Metabase(config) => {
                validate_url("source.url", &config.url)?;
                require("source.username", &config.username)?;
                require("source.password", &config.password)
            }
            SourceConfig::Airflow(config) => {
                validate_url("source.url", &config.url)?;
                require("source.username", &config.username)?;
                if config.page_size == 0 {
                    return Err(Error::invalid_value("source.page_size", "must be at least 1"));
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// BigQuery
// ============================================================================

fn default_bigquery_url() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_page_size() -> u32 {
    1000
}

/// BigQuery project crawl
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BigQueryConfig {
    pub project_id: String,

    /// Path to a service account key file
    #[serde(default)]
    pub credentials_file: Option<String>,

    /// Service account key JSON, inline
    #[serde(default)]
    pub credentials_json: Option<String>,

    /// Datasets (schemas) and tables in scope; the database level is the project
    #[serde(default)]
    pub filter: DatasetFilter,

    /// Crawl `jobs.list` for query logs when set
    #[serde(default)]
    pub query_log: Option<QueryLogConfig>,

    /// API root, overridable for testing
    #[serde(default = "default_bigquery_url")]
    pub base_url: String,

    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,

    /// `maxResults` for list calls
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl BigQueryConfig {
    /// Load the configured service account key
    pub fn service_account_key(&self) -> Result<ServiceAccountKey> {
        match (&self.credentials_file, &self.credentials_json) {
            (Some(path), None) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::FileNotFound { path: path.clone() }
                    } else {
                        Error::Io(e)
                    }
                })?;
                ServiceAccountKey::from_json(&text)
            }
            (None, Some(json)) => ServiceAccountKey::from_json(json),
            _ => Err(Error::config(
                "Exactly one of source.credentials_file or source.credentials_json is required",
            )),
        }
    }

    fn validate(&self) -> Result<()> {
        require("source.project_id", &self.project_id)?;
        if self.credentials_file.is_some() == self.credentials_json.is_some() {
            return Err(Error::config(
                "Exactly one of source.credentials_file or source.credentials_json is required",
            ));
        }
        if self.page_size == 0 {
            return Err(Error::invalid_value("source.page_size", "must be at least 1"));
        }
        validate_url("source.base_url", &self.base_url)?;
        if let Some(query_log) = &self.query_log {
            validate_query_log(query_log)?;
        }
        Ok(())
    }
}

// ============================================================================
// Database
// ============================================================================

/// Database engine reachable through DuckDB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseKind {
    #[serde(alias = "postgres")]
    Postgresql,
    Mysql,
    Sqlite,
    Duckdb,
}

impl DatabaseKind {
    pub fn platform(self) -> DataPlatform {
        match self {
            DatabaseKind::Postgresql => DataPlatform::Postgresql,
            DatabaseKind::Mysql => DataPlatform::Mysql,
            DatabaseKind::Sqlite => DataPlatform::Sqlite,
            DatabaseKind::Duckdb => DataPlatform::Duckdb,
        }
    }

    /// Whether the database is a local file rather than a server
    pub fn is_file(self) -> bool {
        matches!(self, DatabaseKind::Sqlite | DatabaseKind::Duckdb)
    }

    fn default_port(self) -> u16 {
        match self {
            DatabaseKind::Postgresql => 5432,
            DatabaseKind::Mysql => 3306,
            DatabaseKind::Sqlite | DatabaseKind::Duckdb => 0,
        }
    }
}

/// Relational database catalog crawl
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub platform: DatabaseKind,

    /// Full connection string; takes precedence over the individual fields
    #[serde(default)]
    pub connection_string: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Database name; for SQLite and DuckDB, the file path
    #[serde(default)]
    pub database: Option<String>,

    /// Account recorded on dataset ids, e.g. the server host
    #[serde(default)]
    pub account: Option<String>,

    #[serde(default)]
    pub filter: DatasetFilter,
}

impl DatabaseConfig {
    /// DuckDB `ATTACH` target for this database
    pub fn connection_target(&self) -> Result<String> {
        if let Some(conn) = &self.connection_string {
            return Ok(conn.clone());
        }

        let database = self
            .database
            .clone()
            .ok_or_else(|| Error::missing_field("source.database"))?;
        if self.platform.is_file() {
            return Ok(database);
        }

        let host = self.host.as_deref().unwrap_or("localhost");
        let port = self.port.unwrap_or(self.platform.default_port());
        let user = self.user.as_deref().unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        Ok(match self.platform {
            DatabaseKind::Postgresql => format!(
                "host={host} port={port} dbname={database} user={user} password={password}"
            ),
            _ => format!("host={host} port={port} database={database} user={user} password={password}"),
        })
    }

    /// Catalog name the attached database is known by.
    ///
    /// Server databases use their database name; files use the file stem.
    pub fn catalog_name(&self) -> Result<String> {
        let database = self
            .database
            .as_deref()
            .ok_or_else(|| Error::missing_field("source.database"))?;
        let name = if self.platform.is_file() {
            Path::new(database)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(database)
        } else {
            database
        };
        Ok(name.to_string())
    }

    fn validate(&self) -> Result<()> {
        match &self.database {
            Some(database) => require("source.database", database)?,
            None => return Err(Error::missing_field("source.database")),
        }
        if !self.platform.is_file() && self.connection_string.is_none() && self.host.is_none() {
            return Err(Error::config(
                "source.host or source.connection_string is required for server databases",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Metabase
// ============================================================================

/// Metabase instance crawl
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetabaseConfig {
    /// Instance root, e.g. `https://metabase.example.com`
    pub url: String,
    pub username: String,
    pub password: String,

    /// Dashboards in scope, by name
    #[serde(default)]
    pub dashboard_filter: PatternFilter,

    /// Tables in scope, by database/schema/table
    #[serde(default)]
    pub filter: DatasetFilter,

    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,
}

// ============================================================================
// Airflow
// ============================================================================

fn default_airflow_page_size() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

/// Airflow webserver crawl (stable REST API)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirflowConfig {
    /// Webserver root, e.g. `https://airflow.example.com`
    pub url: String,
    pub username: String,
    #[serde(default)]
    pub password: String,

    /// DAGs in scope, by id
    #[serde(default)]
    pub dag_filter: PatternFilter,

    /// Also extract paused DAGs
    #[serde(default = "default_true")]
    pub include_paused: bool,

    /// `limit` for DAG listing
    #[serde(default = "default_airflow_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,
}

// ============================================================================
// Loading
// ============================================================================

/// Load, substitute and validate a run configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<RunConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!("Failed to read config file '{}': {e}", path.display()))
        }
    })?;
    load_config_from_str(&content)
}

/// Load a run configuration from YAML text
pub fn load_config_from_str(yaml: &str) -> Result<RunConfig> {
    let substituted = template::substitute_env(yaml)?;
    let config: RunConfig = serde_yaml::from_str(&substituted)?;
    config.validate()?;
    Ok(config)
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::missing_field(field))
    } else {
        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::invalid_value(field, format!("invalid URL '{value}': {e}")))
}

fn validate_query_log(config: &QueryLogConfig) -> Result<()> {
    if config.logs_per_batch == 0 {
        return Err(Error::invalid_value("source.query_log.logs_per_batch", "must be at least 1"));
    }
    if config.max_sql_length == 0 {
        return Err(Error::invalid_value("source.query_log.max_sql_length", "must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use test_case::test_case;

    const BIGQUERY: &str = r#"
run_name: warehouse
source:
  type: bigquery
  project_id: acme
  credentials_json: '{"client_email": "a@b.iam", "private_key": "k"}'
  filter:
    includes:
      ACME:
        Sales: ~
  query_log:
    lookback_days: 2
    excluded_usernames: [svc@acme.iam]
output:
  location: /tmp/out
  batch_size: 50
concurrency: 4
"#;

    #[test]
    fn test_load_bigquery_config() {
        let config = load_config_from_str(BIGQUERY).unwrap();
        assert_eq!(config.run_name(), "warehouse");
        assert_eq!(config.concurrency, Some(4));
        assert_eq!(config.output.batch_size, 50);

        let SourceConfig::Bigquery(bq) = &config.source else {
            panic!("expected bigquery source");
        };
        assert_eq!(bq.project_id, "acme");
        assert_eq!(bq.page_size, 1000);
        assert!(bq.base_url.starts_with("https://bigquery.googleapis.com"));
        assert!(bq.filter.include_schema("acme", "sales"));
        assert!(!bq.filter.include_schema("acme", "scratch"));
        let query_log = bq.query_log.as_ref().unwrap();
        assert_eq!(query_log.lookback_days, 2);
        assert_eq!(query_log.max_sql_length, 100_000);
        assert_eq!(bq.service_account_key().unwrap().client_email, "a@b.iam");
    }

    #[test]
    fn test_run_name_defaults_to_source_type() {
        let config = load_config_from_str(
            "source: {type: airflow, url: 'http://af:8080', username: admin}\noutput: {location: out}\n",
        )
        .unwrap();
        assert_eq!(config.run_name(), "airflow");
        let SourceConfig::Airflow(af) = &config.source else {
            panic!("expected airflow source");
        };
        assert!(af.include_paused);
        assert_eq!(af.page_size, 100);
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("METADATA_CONNECTORS_TEST_MB_PASSWORD", "hunter2");
        let config = load_config_from_str(
            r#"
source:
  type: metabase
  url: https://mb.example.com
  username: ops@example.com
  password: ${METADATA_CONNECTORS_TEST_MB_PASSWORD}
  dashboard_filter:
    excludes: ["scratch*"]
output:
  location: ${METADATA_CONNECTORS_TEST_UNSET_OUTPUT:-./out}
"#,
        )
        .unwrap();
        let SourceConfig::Metabase(mb) = &config.source else {
            panic!("expected metabase source");
        };
        assert_eq!(mb.password, "hunter2");
        assert!(!mb.dashboard_filter.matches("Scratch Pad"));
        assert_eq!(config.output.location, "./out");
    }

    #[test]
    fn test_undefined_variable_is_config_error() {
        let err = load_config_from_str(
            "source: {type: airflow, url: 'http://af', username: ${METADATA_CONNECTORS_TEST_NOPE}}\noutput: {location: out}\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable { .. }));
    }

    #[test]
    fn test_database_connection_target() {
        let config = load_config_from_str(
            r#"
source:
  type: database
  platform: postgres
  host: db.internal
  user: reader
  password: pw
  database: shop
output:
  location: out
"#,
        )
        .unwrap();
        let SourceConfig::Database(db) = &config.source else {
            panic!("expected database source");
        };
        assert_eq!(db.platform, DatabaseKind::Postgresql);
        assert_eq!(
            db.connection_target().unwrap(),
            "host=db.internal port=5432 dbname=shop user=reader password=pw"
        );
        assert_eq!(db.catalog_name().unwrap(), "shop");
    }

    #[test]
    fn test_file_database_catalog_name() {
        let config: DatabaseConfig =
            serde_yaml::from_str("platform: duckdb\ndatabase: /data/warehouse.duckdb\n").unwrap();
        assert_eq!(config.connection_target().unwrap(), "/data/warehouse.duckdb");
        assert_eq!(config.catalog_name().unwrap(), "warehouse");
        assert!(config.validate().is_ok());
    }

    #[test_case("source: {type: bigquery, project_id: p}\noutput: {location: o}" ; "missing credentials")]
    #[test_case("source: {type: database, platform: mysql, database: shop}\noutput: {location: o}" ; "server without host")]
    #[test_case("source: {type: airflow, url: 'not a url', username: a}\noutput: {location: o}" ; "bad url")]
    #[test_case("source: {type: airflow, url: 'http://af', username: a}\noutput: {location: o}\nconcurrency: 0" ; "zero concurrency")]
    #[test_case("source: {type: airflow, url: 'http://af', username: a}\noutput: {location: o, batch_size: 0}" ; "zero batch size")]
    #[test_case("source: {type: airflow, url: 'http://af', username: a, bogus: 1}\noutput: {location: o}" ; "unknown field")]
    #[test_case("source: {type: tableau}\noutput: {location: o}" ; "unknown source type")]
    #[test_case("source: {type: metabase, url: 'http://mb', username: a, password: b, dashboard_filter: {includes: ['[']}}\noutput: {location: o}" ; "invalid glob")]
    #[test_case("source: {type: database, platform: sqlite, database: a.db, filter: {includes: {db: {s: 3}}}}\noutput: {location: o}" ; "mistyped filter")]
    fn test_invalid_configs(yaml: &str) {
        let err = load_config_from_str(yaml).unwrap_err();
        assert!(err.is_config(), "unexpected error: {err}");
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BIGQUERY.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.source.kind(), "bigquery");

        let err = load_config("/nonexistent/run.yaml").unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn test_credentials_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"client_email": "svc@p.iam", "private_key": "k", "project_id": "p"}"#)
            .unwrap();
        let config = BigQueryConfig {
            project_id: "p".to_string(),
            credentials_file: Some(file.path().display().to_string()),
            credentials_json: None,
            filter: DatasetFilter::default(),
            query_log: None,
            base_url: default_bigquery_url(),
            rate_limit: None,
            page_size: 10,
        };
        assert_eq!(config.service_account_key().unwrap().project_id.as_deref(), Some("p"));
    }
}

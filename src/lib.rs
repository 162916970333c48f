// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Metadata Connectors
//!
//! Connectors that crawl warehouses, databases, BI tools and orchestrators
//! and emit a uniform set of metadata entities: datasets, dashboards,
//! pipelines and query logs.
//!
//! ## Features
//!
//! - **Dataset filtering**: include/exclude trees over database, schema and table
//! - **Query logs**: normalized query history with table lineage parsed from SQL
//! - **Connectors**: BigQuery, relational databases (via DuckDB), Metabase, Airflow
//! - **Output**: chunked NDJSON (and optional Parquet) to local disk or object storage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use metadata_connectors::{build_connector, load_config, run_connector, EntitySink, ExtractContext};
//!
//! #[tokio::main]
//! async fn main() -> metadata_connectors::Result<()> {
//!     let config = load_config("nightly.yaml")?;
//!     let connector = build_connector(&config.source)?;
//!     let sink = EntitySink::new(config.output.clone())?;
//!
//!     let metadata = run_connector(connector.as_ref(), ExtractContext::new(config.run_name()), &sink).await?;
//!     println!("{:?}: {} entities", metadata.status, metadata.entity_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  run_connector: extract() → entities + item errors → RunMetadata │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │ Sources  │   HTTP    │   Paginate    │ Lineage   │   Output    │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ BigQuery │ Retry     │ Cursor        │ sqlparser │ NDJSON      │
//! │ Database │ Rate Limit│ Offset        │ Filters   │ Parquet     │
//! │ Metabase │ Session   │               │           │ S3/GCS/Azure│
//! │ Airflow  │ JWT       │               │           │             │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Name normalization and entity ids
pub mod naming;

/// Dataset and name filters
pub mod filter;

/// Authentication implementations
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Pagination strategies
pub mod pagination;

/// Bounded fan-out
pub mod concurrency;

/// Output entity model
pub mod models;

/// Query-log normalization and SQL lineage
pub mod query_log;

/// Entity and run metadata output
pub mod output;

/// Run configuration
pub mod config;

/// Environment variable substitution
pub mod template;

/// Connector trait and extraction context
pub mod connector;

/// Built-in connectors
pub mod connectors;

/// Database catalogs via DuckDB
pub mod database;

/// Run driver
pub mod runner;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};

// Re-export commonly used types
pub use config::{load_config, load_config_from_str, RunConfig, SourceConfig};
pub use connector::{Connector, ExtractContext};
pub use connectors::build_connector;
pub use filter::{DatasetFilter, PatternFilter};
pub use models::{Entity, RunMetadata, RunStatus};
pub use output::{EntitySink, OutputConfig};
pub use runner::run_connector;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

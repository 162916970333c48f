//! Database catalogs via DuckDB
//!
//! DuckDB attaches PostgreSQL, MySQL, SQLite and DuckDB databases, so one
//! catalog reader serves every relational source.

mod catalog;

pub use catalog::{
    default_exclusions, system_schemas, CatalogColumn, CatalogReader, CatalogTable,
};

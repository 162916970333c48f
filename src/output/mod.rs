//! Output module
//!
//! Writes run results to a local directory or object storage:
//! - entities as chunked newline-delimited JSON
//! - query logs optionally as Parquet
//! - run metadata as `run.json`

mod cloud;
mod columnar;
mod sink;

pub use cloud::CloudDestination;
pub use columnar::{query_log_schema, query_logs_to_batch, write_parquet_bytes, ParquetWriterConfig};
pub use sink::{EntitySink, OutputConfig};

#[cfg(test)]
mod tests;

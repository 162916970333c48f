//! Query log pipeline
//!
//! Connectors translate vendor audit records into [`RawQuery`] values and
//! hand them to a [`QueryLogProcessor`], which hashes, caps and filters them
//! and derives table lineage from the SQL when the vendor did not supply it.

mod lineage;
mod processor;
mod types;

pub use lineage::{extract_table_lineage, TableLineage};
pub use processor::{
    into_batches, resolve_table_refs, sql_hash, sql_upstream, truncate_chars, QueryLogProcessor,
    TableScope,
};
pub use types::{QueriedDataset, QueryLog, QueryLogConfig, RawQuery, RawTableRef};

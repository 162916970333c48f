//! Query logs as Parquet
//!
//! Query logs are the one high-volume entity kind, so they can additionally
//! be written as a columnar file for direct loading into a warehouse.

use crate::error::{Error, Result};
use crate::query_log::{QueriedDataset, QueryLog};
use arrow::array::{
    ArrayRef, Float64Array, Int64Array, ListBuilder, StringArray, StringBuilder,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::sync::{Arc, LazyLock};

/// Configuration for the Parquet writer
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    compression: Compression,
    row_group_size: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: 1024 * 1024,
        }
    }
}

impl ParquetWriterConfig {
    #[must_use]
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    #[must_use]
    pub fn uncompressed(mut self) -> Self {
        self.compression = Compression::UNCOMPRESSED;
        self
    }

    #[must_use]
    pub fn zstd(mut self) -> Self {
        self.compression = Compression::ZSTD(ZstdLevel::default());
        self
    }

    fn build_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }
}

fn list_of_strings() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)))
}

static QUERY_LOG_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("query_id", DataType::Utf8, false),
        Field::new("platform", DataType::Utf8, false),
        Field::new("account", DataType::Utf8, true),
        Field::new("sql", DataType::Utf8, false),
        Field::new("sql_hash", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("email", DataType::Utf8, true),
        Field::new("default_database", DataType::Utf8, true),
        Field::new("default_schema", DataType::Utf8, true),
        Field::new(
            "start_time",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("duration", DataType::Float64, true),
        Field::new("rows_read", DataType::Int64, true),
        Field::new("rows_written", DataType::Int64, true),
        Field::new("bytes_read", DataType::Int64, true),
        Field::new("bytes_written", DataType::Int64, true),
        Field::new("sources", list_of_strings(), false),
        Field::new("targets", list_of_strings(), false),
        Field::new("type", DataType::Utf8, true),
    ]))
});

/// Arrow schema of a query log row
pub fn query_log_schema() -> SchemaRef {
    Arc::clone(&QUERY_LOG_SCHEMA)
}

fn strings<'a>(logs: &'a [QueryLog], f: impl Fn(&'a QueryLog) -> Option<&'a str>) -> ArrayRef {
    Arc::new(logs.iter().map(f).collect::<StringArray>())
}

fn ints(logs: &[QueryLog], f: impl Fn(&QueryLog) -> Option<i64>) -> ArrayRef {
    Arc::new(logs.iter().map(f).collect::<Int64Array>())
}

fn dataset_ids(logs: &[QueryLog], f: impl Fn(&QueryLog) -> &[QueriedDataset]) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for log in logs {
        for dataset in f(log) {
            builder.values().append_value(&dataset.id);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// Convert query logs into one record batch
pub fn query_logs_to_batch(logs: &[QueryLog]) -> Result<RecordBatch> {
    let platforms: Vec<String> = logs.iter().map(|l| l.platform.to_string()).collect();
    let start_times: TimestampMicrosecondArray = logs
        .iter()
        .map(|l| Some(l.start_time.timestamp_micros()))
        .collect::<TimestampMicrosecondArray>()
        .with_timezone("UTC");

    let columns: Vec<ArrayRef> = vec![
        strings(logs, |l| Some(l.query_id.as_str())),
        Arc::new(StringArray::from_iter_values(platforms)),
        strings(logs, |l| l.account.as_deref()),
        strings(logs, |l| Some(l.sql.as_str())),
        strings(logs, |l| Some(l.sql_hash.as_str())),
        strings(logs, |l| l.user_id.as_deref()),
        strings(logs, |l| l.email.as_deref()),
        strings(logs, |l| l.default_database.as_deref()),
        strings(logs, |l| l.default_schema.as_deref()),
        Arc::new(start_times),
        Arc::new(logs.iter().map(|l| l.duration).collect::<Float64Array>()),
        ints(logs, |l| l.rows_read),
        ints(logs, |l| l.rows_written),
        ints(logs, |l| l.bytes_read),
        ints(logs, |l| l.bytes_written),
        dataset_ids(logs, |l| l.sources.as_slice()),
        dataset_ids(logs, |l| l.targets.as_slice()),
        strings(logs, |l| l.query_type.as_deref()),
    ];

    Ok(RecordBatch::try_new(query_log_schema(), columns)?)
}

/// Encode record batches as an in-memory Parquet file
pub fn write_parquet_bytes(batches: &[RecordBatch], config: &ParquetWriterConfig) -> Result<Bytes> {
    let schema = batches
        .first()
        .map(RecordBatch::schema)
        .ok_or_else(|| Error::output("No batches to write"))?;

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(config.build_properties()))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(Bytes::from(buffer))
}

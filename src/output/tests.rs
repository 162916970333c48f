//! Tests for the output module

use super::sink::chunk_lines;
use super::*;
use crate::models::{DataPlatform, Dataset, Entity, QueryLogs, RunMetadata, RunStatus};
use crate::query_log::{QueriedDataset, QueryLog};
use chrono::{TimeZone, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::tempdir;

fn dataset(table: &str) -> Entity {
    Entity::Dataset(Dataset::new(DataPlatform::Postgresql, None, Some("db"), Some("public"), table))
}

fn query_log(id: &str) -> QueryLog {
    QueryLog {
        query_id: format!("bigquery:{id}"),
        platform: DataPlatform::Bigquery,
        account: Some("proj".to_string()),
        sql: "SELECT * FROM d.t".to_string(),
        sql_hash: "abc".to_string(),
        user_id: None,
        email: Some("a@b.c".to_string()),
        default_database: Some("proj".to_string()),
        default_schema: None,
        start_time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        duration: Some(1.5),
        rows_read: Some(10),
        rows_written: None,
        bytes_read: Some(2048),
        bytes_written: None,
        sources: vec![QueriedDataset {
            id: "DATASET~X".to_string(),
            database: Some("proj".to_string()),
            schema: Some("d".to_string()),
            table: "t".to_string(),
        }],
        targets: Vec::new(),
        query_type: Some("SELECT".to_string()),
    }
}

fn sink(dir: &Path, config: impl FnOnce(&mut OutputConfig)) -> EntitySink {
    let mut output = OutputConfig::new(dir.to_str().unwrap());
    config(&mut output);
    EntitySink::with_timestamp(output, Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap()).unwrap()
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// ============================================================================
// Chunking
// ============================================================================

#[test]
fn test_chunk_lines_by_count() {
    let lines = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
    let chunks = chunk_lines(lines, 2, usize::MAX);
    assert_eq!(chunks, vec![b"a\nb\n".to_vec(), b"c\n".to_vec()]);
}

#[test]
fn test_chunk_lines_by_size() {
    let lines = vec![b"aaaa".to_vec(), b"bbbb".to_vec(), b"cc".to_vec()];
    let chunks = chunk_lines(lines, 100, 9);
    assert_eq!(chunks, vec![b"aaaa\n".to_vec(), b"bbbb\ncc\n".to_vec()]);
}

#[test]
fn test_chunk_lines_oversized_line_gets_own_chunk() {
    let lines = vec![b"x".to_vec(), vec![b'y'; 50], b"z".to_vec()];
    let chunks = chunk_lines(lines, 100, 10);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1].len(), 51);
}

#[test]
fn test_chunk_lines_empty() {
    assert!(chunk_lines(Vec::new(), 10, 10).is_empty());
}

// ============================================================================
// EntitySink
// ============================================================================

#[tokio::test]
async fn test_write_chunked_files() {
    let dir = tempdir().unwrap();
    let sink = sink(dir.path(), |c| c.batch_size = 2);

    let entities: Vec<_> = ["a", "b", "c", "d", "e"].into_iter().map(dataset).collect();
    let locations = sink.write(&entities, "pg nightly").await.unwrap();
    assert_eq!(
        locations,
        vec![
            "file://pg_nightly/20240601T083000Z/1-of-3.json",
            "file://pg_nightly/20240601T083000Z/2-of-3.json",
            "file://pg_nightly/20240601T083000Z/3-of-3.json",
        ]
    );

    let run_dir = dir.path().join("pg_nightly/20240601T083000Z");
    let first = read_lines(&run_dir.join("1-of-3.json"));
    assert_eq!(first.len(), 2);
    assert_eq!(first[0]["kind"], "dataset");
    assert_eq!(first[0]["logical_id"]["name"], "db.public.a");
    assert_eq!(read_lines(&run_dir.join("3-of-3.json")).len(), 1);
}

#[tokio::test]
async fn test_write_respects_max_file_bytes() {
    let dir = tempdir().unwrap();
    let line_len = serde_json::to_vec(&dataset("a")).unwrap().len();
    let sink = sink(dir.path(), |c| c.max_file_bytes = line_len * 2 + 2);

    let entities: Vec<_> = ["a", "b", "c"].into_iter().map(dataset).collect();
    let locations = sink.write(&entities, "run").await.unwrap();
    assert_eq!(locations.len(), 2);
    assert!(locations[0].ends_with("1-of-2.json"));
}

#[tokio::test]
async fn test_write_nothing_for_empty_run() {
    let dir = tempdir().unwrap();
    let sink = sink(dir.path(), |_| {});
    assert!(sink.write(&[], "run").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_query_logs_parquet() {
    let dir = tempdir().unwrap();
    let sink = sink(dir.path(), |c| c.query_logs_parquet = true);

    let entities = vec![
        dataset("t"),
        Entity::QueryLogs(QueryLogs {
            logs: vec![query_log("1"), query_log("2")],
        }),
        Entity::QueryLogs(QueryLogs {
            logs: vec![query_log("3")],
        }),
    ];
    let locations = sink.write(&entities, "bq").await.unwrap();
    assert!(locations.last().unwrap().ends_with("query_logs.parquet"));

    let data = std::fs::read(dir.path().join("bq/20240601T083000Z/query_logs.parquet")).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(data))
        .unwrap()
        .build()
        .unwrap();
    let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
    assert_eq!(rows, 3);
}

#[test]
fn test_query_logs_to_batch_schema() {
    let batch = query_logs_to_batch(&[query_log("1")]).unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(batch.schema(), query_log_schema());
    assert!(write_parquet_bytes(&[], &ParquetWriterConfig::default()).is_err());
    let bytes = write_parquet_bytes(&[batch], &ParquetWriterConfig::default().zstd()).unwrap();
    assert_eq!(&bytes[..4], b"PAR1");
}

#[tokio::test]
async fn test_write_run_metadata() {
    let dir = tempdir().unwrap();
    let sink = sink(dir.path(), |_| {});
    let metadata = RunMetadata {
        crawler_name: "airflow".to_string(),
        platform: None,
        run_name: "af".to_string(),
        start_time: Utc::now(),
        end_time: Utc::now(),
        status: RunStatus::Failure,
        error_message: Some("Authentication failed".to_string()),
        stack_trace: None,
        entity_count: 0,
        item_error_count: 0,
        item_errors: Vec::new(),
    };
    let location = sink.write_run_metadata(&metadata).await.unwrap();
    assert_eq!(location, "file://af/20240601T083000Z/run.json");

    let text = std::fs::read_to_string(dir.path().join("af/20240601T083000Z/run.json")).unwrap();
    let back: RunMetadata = serde_json::from_str(&text).unwrap();
    assert_eq!(back, metadata);
}

#[test]
fn test_output_config_validation() {
    let dir = tempdir().unwrap();
    let mut config = OutputConfig::new(dir.path().to_str().unwrap());
    config.batch_size = 0;
    assert!(EntitySink::new(config).unwrap_err().is_config());

    let parsed: OutputConfig = serde_yaml::from_str("location: /tmp/out").unwrap();
    assert_eq!(parsed.batch_size, 200);
    assert!(!parsed.query_logs_parquet);
}

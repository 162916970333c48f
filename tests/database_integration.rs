//! Database integration tests
//!
//! The DuckDB tests run against a temporary file. The PostgreSQL test
//! requires a live database: set POSTGRES_TEST_URL to run it.

use duckdb::Connection;
use metadata_connectors::{
    build_connector, load_config_from_str, run_connector, Entity, EntitySink, ExtractContext,
    RunStatus,
};
use tempfile::TempDir;

/// Get test connection string from environment or skip
fn get_test_connection() -> Option<String> {
    std::env::var("POSTGRES_TEST_URL").ok()
}

fn create_shop(dir: &TempDir) -> String {
    let path = dir.path().join("shop.duckdb");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE SCHEMA crm;
         CREATE TABLE crm.accounts (id BIGINT PRIMARY KEY, region VARCHAR);
         CREATE TABLE crm.contacts (id BIGINT, account_id BIGINT, email VARCHAR);
         CREATE VIEW crm.emea_contacts AS
           SELECT c.* FROM crm.contacts c JOIN crm.accounts a ON a.id = c.account_id
           WHERE a.region = 'EMEA';
         CREATE SCHEMA staging;
         CREATE TABLE staging.raw_contacts (payload VARCHAR);",
    )
    .unwrap();
    path.display().to_string()
}

fn read_entities(output: &std::path::Path) -> Vec<Entity> {
    let run_root = output.join("shop");
    let timestamp_dir = std::fs::read_dir(&run_root)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let chunk = std::fs::read_to_string(timestamp_dir.join("1-of-1.json")).unwrap();
    chunk.lines().map(|line| serde_json::from_str(line).unwrap()).collect()
}

#[tokio::test]
async fn test_duckdb_file_run() {
    let dir = tempfile::tempdir().unwrap();
    let database = create_shop(&dir);
    let output = dir.path().join("out");

    let config = load_config_from_str(&format!(
        r"
run_name: shop
source:
  type: database
  platform: duckdb
  database: {database}
  filter:
    excludes:
      shop:
        staging: ~
output:
  location: {output}
",
        output = output.display()
    ))
    .unwrap();

    let connector = build_connector(&config.source).unwrap();
    let sink = EntitySink::new(config.output.clone()).unwrap();
    let metadata = run_connector(connector.as_ref(), ExtractContext::new(config.run_name()), &sink)
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Success);
    assert_eq!(metadata.platform.as_deref(), Some("DUCKDB"));
    assert_eq!(metadata.entity_count, 3);

    let entities = read_entities(&output);
    let names: Vec<_> = entities
        .iter()
        .map(|e| e.as_dataset().unwrap().logical_id.name.clone())
        .collect();
    assert_eq!(
        names,
        vec!["shop.crm.accounts", "shop.crm.contacts", "shop.crm.emea_contacts"]
    );

    let view = entities[2].as_dataset().unwrap();
    let mut upstream = view.upstream.as_ref().unwrap().source_datasets.clone();
    upstream.sort();
    let mut expected = vec![entities[0].as_dataset().unwrap().entity_id(), entities[1].as_dataset().unwrap().entity_id()];
    expected.sort();
    assert_eq!(upstream, expected);
}

#[tokio::test]
async fn test_postgres_run() {
    let Some(conn_str) = get_test_connection() else {
        println!("Skipping: POSTGRES_TEST_URL not set");
        return;
    };

    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from_str(&format!(
        "source:\n  type: database\n  platform: postgresql\n  connection_string: \"{conn_str}\"\n  database: postgres\noutput:\n  location: {}\n",
        dir.path().display()
    ))
    .unwrap();

    let connector = build_connector(&config.source).unwrap();
    let sink = EntitySink::new(config.output.clone()).unwrap();
    let metadata = run_connector(connector.as_ref(), ExtractContext::new(config.run_name()), &sink)
        .await
        .unwrap();

    assert_ne!(metadata.status, RunStatus::Failure, "{:?}", metadata.error_message);
}

//! Tests for the filter module

use super::*;
use serde_json::json;
use test_case::test_case;

fn filter(value: serde_json::Value) -> DatasetFilter {
    serde_json::from_value(value).unwrap()
}

fn tables(names: &[&str]) -> Option<TableFilter> {
    Some(names.iter().map(|n| (*n).to_string()).collect())
}

// ============================================================================
// DatasetFilter: include_table
// ============================================================================

#[test]
fn test_no_rules_includes_everything() {
    let f = DatasetFilter::default();
    assert!(f.is_empty());
    assert!(f.include_table("db", "schema", "table"));
    assert!(f.include_table("", "", ""));
    assert!(f.include_schema("any", "thing"));
    assert!(f.include_database("whatever"));
}

#[test]
fn test_whole_database_include() {
    let f = filter(json!({"includes": {"db1": null}}));
    assert!(f.include_table("db1", "s", "t"));
    assert!(f.include_table("db1", "other", "x"));
    assert!(!f.include_table("db2", "s", "t"));
}

#[test_case("db2", "schema1", "x" => true ; "whole schema")]
#[test_case("db2", "schema2", "table1" => true ; "listed table")]
#[test_case("db2", "schema2", "table2" => true ; "second listed table")]
#[test_case("db2", "schema2", "x" => false ; "unlisted table")]
#[test_case("db2", "schema3", "x" => false ; "unlisted schema")]
#[test_case("db1", "schema1", "x" => false ; "unlisted database")]
fn test_nested_includes(database: &str, schema: &str, table: &str) -> bool {
    let f = filter(json!({
        "includes": {
            "db2": {
                "schema1": null,
                "schema2": ["table1", "table2"]
            }
        }
    }));
    f.include_table(database, schema, table)
}

#[test_case("db1", "schema1", "table1" => false ; "excluded table")]
#[test_case("db1", "schema1", "table2" => true ; "sibling table")]
#[test_case("db1", "schema2", "anything" => true ; "other schema")]
#[test_case("db2", "x", "y" => false ; "outside includes")]
fn test_end_to_end_example(database: &str, schema: &str, table: &str) -> bool {
    let f = filter(json!({
        "includes": {"db1": null},
        "excludes": {"db1": {"schema1": ["table1"]}}
    }));
    f.include_table(database, schema, table)
}

#[test]
fn test_excludes_win_over_includes() {
    let f = filter(json!({
        "includes": {"db": {"s": ["t"]}},
        "excludes": {"db": {"s": ["t"]}}
    }));
    assert!(!f.include_table("db", "s", "t"));

    // Excludes are checked even when includes do not mention the schema
    let f = filter(json!({
        "includes": {"db": null},
        "excludes": {"db": {"private": null}}
    }));
    assert!(!f.include_table("db", "private", "t"));
    assert!(f.include_table("db", "public", "t"));
}

#[test]
fn test_excludes_only() {
    let f = filter(json!({"excludes": {"db": {"s": ["t"]}, "secret": null}}));
    assert!(!f.include_table("db", "s", "t"));
    assert!(f.include_table("db", "s", "u"));
    assert!(!f.include_table("secret", "a", "b"));
    assert!(f.include_table("other", "a", "b"));
}

#[test]
fn test_empty_collections_mean_whole_scope() {
    let f = filter(json!({"includes": {"db": {}}}));
    assert!(f.include_table("db", "any", "table"));

    let f = filter(json!({"includes": {"db": {"s": []}}}));
    assert!(f.include_table("db", "s", "any"));
    assert!(!f.include_table("db", "t", "any"));

    let f = filter(json!({"excludes": {"db": {"s": []}}}));
    assert!(!f.include_table("db", "s", "any"));
    assert!(f.include_table("db", "t", "any"));
}

#[test]
fn test_case_insensitive_matching() {
    let f = filter(json!({
        "includes": {"DB1": {"Schema1": ["Table1"]}}
    }));
    assert!(f.include_table("DB1", "Schema1", "Table1"));
    assert!(f.include_table("db1", "schema1", "table1"));
    assert!(f.include_table("Db1", "SCHEMA1", "tAbLe1"));
    assert!(!f.include_table("db1", "schema1", "table2"));
}

// ============================================================================
// DatasetFilter: include_schema / include_database
// ============================================================================

#[test]
fn test_include_schema() {
    let f = filter(json!({
        "includes": {"db1": null, "db2": {"schema1": ["t"]}},
        "excludes": {"db1": {"private": null, "mixed": ["secret"]}}
    }));

    assert!(f.include_schema("db1", "public"));
    assert!(!f.include_schema("db1", "private"));
    // Partially excluded schemas are still enumerated
    assert!(f.include_schema("db1", "mixed"));
    assert!(!f.include_table("db1", "mixed", "secret"));
    assert!(f.include_table("db1", "mixed", "open"));

    assert!(f.include_schema("db2", "schema1"));
    assert!(!f.include_schema("db2", "schema2"));
    assert!(!f.include_schema("db3", "schema1"));
}

#[test]
fn test_include_database() {
    let f = filter(json!({
        "includes": {"db1": null, "db2": {"s": null}},
        "excludes": {"db2": {"s": null}, "db1": {}}
    }));
    assert!(!f.include_database("db1"));
    assert!(f.include_database("db2"));
    assert!(!f.include_database("db3"));
}

// ============================================================================
// DatasetFilter: normalize / merge
// ============================================================================

#[test]
fn test_normalize_lowercases_everything() {
    let mut includes = DatabaseFilter::new();
    let mut schemas = SchemaFilter::new();
    schemas.insert("Schema".to_string(), tables(&["TableA", "tableB"]));
    includes.insert("DB".to_string(), Some(schemas));

    let normalized = DatasetFilter::including(includes);

    let mut expected_schemas = SchemaFilter::new();
    expected_schemas.insert("schema".to_string(), tables(&["tablea", "tableb"]));
    let mut expected = DatabaseFilter::new();
    expected.insert("db".to_string(), Some(expected_schemas));

    assert_eq!(normalized.includes(), Some(&expected));
    assert!(normalized.excludes().is_none());
    assert_eq!(normalized.normalize(), normalized);
}

#[test]
fn test_constructed_filter_matches_mixed_case_names() {
    let mut includes = DatabaseFilter::new();
    includes.insert("DB1".to_string(), None);
    let mut excludes = DatabaseFilter::new();
    let mut schemas = SchemaFilter::new();
    schemas.insert("Staging".to_string(), tables(&["Tmp"]));
    excludes.insert("Db1".to_string(), Some(schemas));

    let f = DatasetFilter::new(Some(includes), Some(excludes));
    assert!(f.include_table("DB1", "s", "t"));
    assert!(f.include_table("db1", "S", "T"));
    assert!(!f.include_table("db1", "STAGING", "tmp"));
    assert_eq!(f, f.normalize());
}

#[test]
fn test_normalize_merges_colliding_keys() {
    let mut includes = DatabaseFilter::new();
    let mut upper = SchemaFilter::new();
    upper.insert("S".to_string(), tables(&["A"]));
    let mut lower = SchemaFilter::new();
    lower.insert("s".to_string(), tables(&["b"]));
    includes.insert("DB".to_string(), Some(upper));
    includes.insert("db".to_string(), Some(lower));

    let normalized = DatasetFilter::including(includes);

    assert!(normalized.include_table("db", "s", "a"));
    assert!(normalized.include_table("db", "s", "b"));
    assert!(!normalized.include_table("db", "s", "c"));
    assert_eq!(normalized.normalize(), normalized);
}

#[test]
fn test_normalize_is_idempotent_for_deserialized_filters() {
    let f = filter(json!({
        "includes": {"A": {"B": ["C", "c"], "b": null}, "a": {"x": []}},
        "excludes": {"Z": null}
    }));
    assert_eq!(f.normalize(), f);
    assert_eq!(f.normalize().normalize(), f.normalize());
    // whole-scope wins when the same schema collides with a list
    assert!(f.include_table("a", "b", "anything"));
}

#[test]
fn test_merge_default_excludes() {
    let user = filter(json!({
        "includes": {"db": null},
        "excludes": {"db": {"staging": ["tmp"]}}
    }));
    let defaults = filter(json!({
        "excludes": {"db": {"information_schema": null, "staging": ["scratch"]}}
    }));

    let merged = user.merge(&defaults);
    assert!(merged.include_table("db", "public", "orders"));
    assert!(!merged.include_table("db", "information_schema", "tables"));
    assert!(!merged.include_table("db", "staging", "tmp"));
    assert!(!merged.include_table("db", "staging", "scratch"));
    assert!(merged.include_table("db", "staging", "kept"));
    // includes untouched when the overlay has none
    assert_eq!(merged.includes(), user.includes());
}

#[test]
fn test_merge_whole_scope_dominates() {
    let left = filter(json!({"excludes": {"db": {"s": ["t"]}}}));
    let right = filter(json!({"excludes": {"db": null}}));

    let merged = left.merge(&right);
    assert_eq!(merged.excludes().unwrap().get("db"), Some(&None));

    let merged = right.merge(&left);
    assert_eq!(merged.excludes().unwrap().get("db"), Some(&None));
}

#[test]
fn test_merge_absent_trees() {
    let empty = DatasetFilter::default();
    assert_eq!(empty.merge(&empty), empty);

    let only = filter(json!({"includes": {"db": null}}));
    assert_eq!(empty.merge(&only), only);
    assert_eq!(only.merge(&empty), only);
}

#[test]
fn test_invalid_schema_filter_fails_to_deserialize() {
    let result: Result<DatasetFilter, _> =
        serde_json::from_value(json!({"includes": {"db": {"schema": "table"}}}));
    assert!(result.is_err());

    let result: Result<DatasetFilter, _> = serde_yaml::from_str("includes:\n  db: [a, b]\n");
    assert!(result.is_err());

    let result: Result<DatasetFilter, _> = serde_json::from_value(json!({"include": {}}));
    assert!(result.is_err());
}

#[test]
fn test_deserialize_from_yaml() {
    let yaml = r"
includes:
  Analytics:
  Warehouse:
    Public:
    Sales: [Orders, Customers]
excludes:
  warehouse:
    sales: [customers]
";
    let f: DatasetFilter = serde_yaml::from_str(yaml).unwrap();
    assert!(f.include_table("analytics", "x", "y"));
    assert!(f.include_table("warehouse", "public", "y"));
    assert!(f.include_table("WAREHOUSE", "SALES", "ORDERS"));
    assert!(!f.include_table("warehouse", "sales", "customers"));
    assert!(!f.include_table("warehouse", "finance", "ledger"));
}

// ============================================================================
// PatternFilter
// ============================================================================

#[test]
fn test_pattern_filter_empty_matches_all() {
    let f = PatternFilter::default();
    assert!(f.is_empty());
    assert!(f.matches("anything"));
}

#[test_case("sales_daily" => true ; "matches include")]
#[test_case("Sales_Weekly" => true ; "case insensitive")]
#[test_case("sales_test" => false ; "excluded")]
#[test_case("marketing" => false ; "not included")]
fn test_pattern_filter(name: &str) -> bool {
    let f = PatternFilter::new(&["sales_*"], &["*_test"]).unwrap();
    f.matches(name)
}

#[test]
fn test_pattern_filter_serde() {
    let f: PatternFilter =
        serde_yaml::from_str("includes: [\"Finance*\"]\nexcludes: [\"*draft*\"]").unwrap();
    assert!(f.matches("finance overview"));
    assert!(!f.matches("finance draft"));

    let round: serde_json::Value = serde_json::to_value(&f).unwrap();
    assert_eq!(round, json!({"includes": ["finance*"], "excludes": ["*draft*"]}));

    let bad: Result<PatternFilter, _> = serde_yaml::from_str("includes: [\"[unclosed\"]");
    assert!(bad.is_err());
}

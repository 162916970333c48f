//! Hierarchical dataset filter
//!
//! Include/exclude trees keyed by database → schema → set of tables.
//! A `None` value at any level (or an empty map/set) puts the whole
//! sub-tree in scope. Keys are stored lower-cased.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Set of lower-cased table names
pub type TableFilter = BTreeSet<String>;

/// Schema name → tables (`None` = every table in the schema)
pub type SchemaFilter = BTreeMap<String, Option<TableFilter>>;

/// Database name → schemas (`None` = every schema in the database)
pub type DatabaseFilter = BTreeMap<String, Option<SchemaFilter>>;

/// Decides whether a (database, schema, table) triple should be extracted.
///
/// Excludes always win over includes. With neither tree configured,
/// everything is in scope. Built only through [`DatasetFilter::new`] (or its
/// shorthands) and deserialization, so the trees are always lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDatasetFilter")]
pub struct DatasetFilter {
    /// Objects to extract (`None` = no include restriction)
    #[serde(skip_serializing_if = "Option::is_none")]
    includes: Option<DatabaseFilter>,

    /// Objects to skip, checked independently of `includes`
    #[serde(skip_serializing_if = "Option::is_none")]
    excludes: Option<DatabaseFilter>,
}

impl DatasetFilter {
    /// Create a filter, normalizing every key
    pub fn new(includes: Option<DatabaseFilter>, excludes: Option<DatabaseFilter>) -> Self {
        Self { includes, excludes }.normalize()
    }

    /// A filter that only excludes
    pub fn excluding(excludes: DatabaseFilter) -> Self {
        Self::new(None, Some(excludes))
    }

    /// A filter that only includes
    pub fn including(includes: DatabaseFilter) -> Self {
        Self::new(Some(includes), None)
    }

    pub fn includes(&self) -> Option<&DatabaseFilter> {
        self.includes.as_ref()
    }

    pub fn excludes(&self) -> Option<&DatabaseFilter> {
        self.excludes.as_ref()
    }

    /// Whether any rule is configured
    pub fn is_empty(&self) -> bool {
        self.includes.is_none() && self.excludes.is_none()
    }

    /// Return a copy with every key lower-cased.
    ///
    /// Keys that collide after lower-casing are merged the same way
    /// [`DatasetFilter::merge`] merges trees, so the result is idempotent.
    #[must_use]
    pub fn normalize(&self) -> Self {
        Self {
            includes: self.includes.as_ref().map(normalize_tree),
            excludes: self.excludes.as_ref().map(normalize_tree),
        }
    }

    /// Overlay another filter (typically a default exclusion list) onto this one.
    ///
    /// Trees are unioned level by level. A tree absent on one side yields the
    /// other side's tree unchanged.
    #[must_use]
    pub fn merge(&self, other: &DatasetFilter) -> Self {
        Self {
            includes: merge_optional_trees(self.includes.as_ref(), other.includes.as_ref()),
            excludes: merge_optional_trees(self.excludes.as_ref(), other.excludes.as_ref()),
        }
    }

    /// Whether a table should be extracted
    pub fn include_table(&self, database: &str, schema: &str, table: &str) -> bool {
        let database = database.to_lowercase();
        let schema = schema.to_lowercase();
        let table = table.to_lowercase();

        if let Some(includes) = &self.includes {
            if !covers_table(includes, &database, &schema, &table) {
                return false;
            }
        }

        if let Some(excludes) = &self.excludes {
            if covers_table(excludes, &database, &schema, &table) {
                return false;
            }
        }

        true
    }

    /// Whether a schema is worth enumerating.
    ///
    /// A schema with only some of its tables excluded is still included;
    /// [`DatasetFilter::include_table`] makes the final call per table.
    pub fn include_schema(&self, database: &str, schema: &str) -> bool {
        let database = database.to_lowercase();
        let schema = schema.to_lowercase();

        if let Some(includes) = &self.includes {
            let covered = match includes.get(&database) {
                None => false,
                Some(schemas) => whole(schemas.as_ref()) || schemas_contain(schemas, &schema),
            };
            if !covered {
                return false;
            }
        }

        if let Some(excludes) = &self.excludes {
            if let Some(schemas) = excludes.get(&database) {
                let excluded = match schemas.as_ref().filter(|s| !s.is_empty()) {
                    None => true,
                    Some(schemas) => schemas.get(&schema).is_some_and(|t| whole(t.as_ref())),
                };
                if excluded {
                    return false;
                }
            }
        }

        true
    }

    /// Whether a database is worth enumerating
    pub fn include_database(&self, database: &str) -> bool {
        let database = database.to_lowercase();

        if let Some(includes) = &self.includes {
            if !includes.contains_key(&database) {
                return false;
            }
        }

        if let Some(excludes) = &self.excludes {
            if excludes.get(&database).is_some_and(|s| whole(s.as_ref())) {
                return false;
            }
        }

        true
    }
}

/// `None` or an empty collection means "everything below this level"
fn whole<T: IsEmpty>(value: Option<&T>) -> bool {
    value.map_or(true, IsEmpty::is_empty)
}

fn schemas_contain(schemas: &Option<SchemaFilter>, schema: &str) -> bool {
    schemas.as_ref().is_some_and(|s| s.contains_key(schema))
}

trait IsEmpty {
    fn is_empty(&self) -> bool;
}

impl IsEmpty for SchemaFilter {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

impl IsEmpty for TableFilter {
    fn is_empty(&self) -> bool {
        BTreeSet::is_empty(self)
    }
}

/// Whether a tree covers a (normalized) triple
fn covers_table(tree: &DatabaseFilter, database: &str, schema: &str, table: &str) -> bool {
    let Some(schemas) = tree.get(database) else {
        return false;
    };
    let Some(schemas) = schemas.as_ref().filter(|s| !s.is_empty()) else {
        return true;
    };
    let Some(tables) = schemas.get(schema) else {
        return false;
    };
    match tables {
        Some(tables) if !tables.is_empty() => tables.contains(table),
        _ => true,
    }
}

fn normalize_tree(tree: &DatabaseFilter) -> DatabaseFilter {
    let mut normalized = DatabaseFilter::new();
    for (database, schemas) in tree {
        let schemas = schemas.as_ref().map(|schemas| {
            let mut lowered = SchemaFilter::new();
            for (schema, tables) in schemas {
                let tables = tables
                    .as_ref()
                    .map(|t| t.iter().map(|name| name.to_lowercase()).collect());
                merge_schema_entry(&mut lowered, schema.to_lowercase(), tables);
            }
            lowered
        });
        merge_database_entry(&mut normalized, database.to_lowercase(), schemas);
    }
    normalized
}

fn merge_optional_trees(
    left: Option<&DatabaseFilter>,
    right: Option<&DatabaseFilter>,
) -> Option<DatabaseFilter> {
    match (left, right) {
        (None, None) => None,
        (Some(tree), None) | (None, Some(tree)) => Some(tree.clone()),
        (Some(left), Some(right)) => {
            let mut merged = left.clone();
            for (database, schemas) in right {
                merge_database_entry(&mut merged, database.clone(), schemas.clone());
            }
            Some(merged)
        }
    }
}

fn merge_database_entry(tree: &mut DatabaseFilter, database: String, schemas: Option<SchemaFilter>) {
    match tree.entry(database) {
        Entry::Vacant(entry) => {
            entry.insert(schemas);
        }
        Entry::Occupied(mut entry) => {
            let merged = match (entry.get_mut().take(), schemas) {
                (Some(mut existing), Some(incoming))
                    if !existing.is_empty() && !incoming.is_empty() =>
                {
                    for (schema, tables) in incoming {
                        merge_schema_entry(&mut existing, schema, tables);
                    }
                    Some(existing)
                }
                _ => None,
            };
            *entry.get_mut() = merged;
        }
    }
}

fn merge_schema_entry(schemas: &mut SchemaFilter, schema: String, tables: Option<TableFilter>) {
    match schemas.entry(schema) {
        Entry::Vacant(entry) => {
            entry.insert(tables);
        }
        Entry::Occupied(mut entry) => {
            let merged = match (entry.get_mut().take(), tables) {
                (Some(mut existing), Some(incoming))
                    if !existing.is_empty() && !incoming.is_empty() =>
                {
                    existing.extend(incoming);
                    Some(existing)
                }
                _ => None,
            };
            *entry.get_mut() = merged;
        }
    }
}

// ============================================================================
// Deserialization
// ============================================================================

type RawTree = HashMap<String, Option<HashMap<String, Option<Vec<String>>>>>;

/// Filter as written in configuration (lists instead of sets, any case)
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDatasetFilter {
    #[serde(default)]
    includes: Option<RawTree>,
    #[serde(default)]
    excludes: Option<RawTree>,
}

impl From<RawDatasetFilter> for DatasetFilter {
    fn from(raw: RawDatasetFilter) -> Self {
        DatasetFilter::new(raw.includes.map(into_tree), raw.excludes.map(into_tree))
    }
}

fn into_tree(raw: RawTree) -> DatabaseFilter {
    raw.into_iter()
        .map(|(database, schemas)| {
            let schemas = schemas.map(|schemas| {
                schemas
                    .into_iter()
                    .map(|(schema, tables)| (schema, tables.map(|t| t.into_iter().collect())))
                    .collect()
            });
            (database, schemas)
        })
        .collect()
}

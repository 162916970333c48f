//! Canonical names and entity ids
//!
//! Dataset names are lower-cased and dotted: `database.schema.table`,
//! with absent or empty components skipped. Entity ids are derived
//! deterministically from the logical id so repeated runs agree.

use uuid::Uuid;

/// Join database/schema/table into the canonical dotted name
pub fn dataset_normalized_name(database: Option<&str>, schema: Option<&str>, table: &str) -> String {
    [database, schema, Some(table)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(".")
}

/// Lower-case an already dotted name
pub fn normalize_full_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Split a possibly quoted, dotted identifier into its parts.
///
/// `"My DB".public.orders` → `["My DB", "public", "orders"]`. Quotes may be
/// double quotes, backticks or square brackets.
pub fn split_identifier(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut closing: Option<char> = None;

    for ch in name.trim().chars() {
        match closing {
            Some(close) if ch == close => closing = None,
            Some(_) => current.push(ch),
            None => match ch {
                '"' | '`' => closing = Some(ch),
                '[' => closing = Some(']'),
                '.' => parts.push(std::mem::take(&mut current)),
                _ => current.push(ch),
            },
        }
    }
    parts.push(current);
    parts
}

/// Deterministic entity id: `{PREFIX}~{UUIDv5 of key}` in upper case
pub fn entity_id(prefix: &str, key: &str) -> String {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
    format!("{prefix}~{}", id.simple().to_string().to_uppercase())
}

//! Raw query → [`QueryLog`] normalization

use super::lineage::extract_table_lineage;
use super::types::{QueriedDataset, QueryLog, QueryLogConfig, RawQuery, RawTableRef};
use crate::filter::DatasetFilter;
use crate::models::{DataPlatform, DatasetLogicalId, Entity, QueryLogs};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

/// Turns connector-side [`RawQuery`] records into canonical query logs
#[derive(Debug, Clone)]
pub struct QueryLogProcessor {
    platform: DataPlatform,
    account: Option<String>,
    config: QueryLogConfig,
    filter: DatasetFilter,
    excluded_users: HashSet<String>,
}

impl QueryLogProcessor {
    pub fn new(
        platform: DataPlatform,
        account: Option<String>,
        config: QueryLogConfig,
        filter: DatasetFilter,
    ) -> Self {
        let excluded_users = config
            .excluded_usernames
            .iter()
            .map(|u| u.trim().to_lowercase())
            .collect();
        Self {
            platform,
            account,
            config,
            filter,
            excluded_users,
        }
    }

    pub fn config(&self) -> &QueryLogConfig {
        &self.config
    }

    /// Normalize one raw query; `None` when the query is dropped
    pub fn process(&self, raw: RawQuery) -> Option<QueryLog> {
        if raw.sql.trim().is_empty() {
            debug!(query_id = %raw.id, "Skipping query with empty SQL");
            return None;
        }
        if self.is_excluded_user(&raw) {
            debug!(query_id = %raw.id, "Skipping query from excluded user");
            return None;
        }

        let sql_hash = sql_hash(&raw.sql);

        let mut query_type = raw.query_type.clone();
        let (sources, targets) = match (raw.sources.clone(), raw.targets.clone()) {
            (Some(sources), Some(targets)) => (sources, targets),
            (known_sources, known_targets) => {
                match extract_table_lineage(&raw.sql, self.platform) {
                    Ok(lineage) => {
                        if query_type.is_none() {
                            query_type = lineage.statement_type;
                        }
                        (
                            known_sources.unwrap_or(lineage.sources),
                            known_targets.unwrap_or(lineage.targets),
                        )
                    }
                    Err(e) => {
                        debug!(query_id = %raw.id, error = %e, "Unable to parse query lineage");
                        (
                            known_sources.unwrap_or_default(),
                            known_targets.unwrap_or_default(),
                        )
                    }
                }
            }
        };

        let sources = self.resolve(&sources, &raw);
        let targets = self.resolve(&targets, &raw);

        Some(QueryLog {
            query_id: format!("{}:{}", self.platform.to_string().to_lowercase(), raw.id),
            platform: self.platform,
            account: self.account.clone(),
            sql: truncate_chars(&raw.sql, self.config.max_sql_length).to_string(),
            sql_hash,
            user_id: raw.user_id,
            email: raw.email,
            default_database: raw.default_database,
            default_schema: raw.default_schema,
            start_time: raw.start_time,
            duration: raw.duration,
            rows_read: raw.rows_read,
            rows_written: raw.rows_written,
            bytes_read: raw.bytes_read,
            bytes_written: raw.bytes_written,
            sources,
            targets,
            query_type,
        })
    }

    fn is_excluded_user(&self, raw: &RawQuery) -> bool {
        [raw.user_id.as_deref(), raw.email.as_deref()]
            .into_iter()
            .flatten()
            .any(|user| self.excluded_users.contains(&user.trim().to_lowercase()))
    }

    fn resolve(&self, refs: &[RawTableRef], raw: &RawQuery) -> Vec<QueriedDataset> {
        resolve_table_refs(
            refs,
            &TableScope {
                platform: self.platform,
                account: self.account.as_deref(),
                default_database: raw.default_database.as_deref(),
                default_schema: raw.default_schema.as_deref(),
                filter: &self.filter,
            },
        )
    }
}

/// Where unqualified table references resolve to
#[derive(Debug, Clone, Copy)]
pub struct TableScope<'a> {
    pub platform: DataPlatform,
    pub account: Option<&'a str>,
    pub default_database: Option<&'a str>,
    pub default_schema: Option<&'a str>,
    pub filter: &'a DatasetFilter,
}

/// Fill default database/schema, apply the filter, build dataset ids.
///
/// Duplicates (after normalization) are dropped, keeping the first.
pub fn resolve_table_refs(refs: &[RawTableRef], scope: &TableScope<'_>) -> Vec<QueriedDataset> {
    let mut seen = HashSet::new();
    refs.iter()
        .filter_map(|table_ref| {
            let (database, schema) = match (&table_ref.database, &table_ref.schema) {
                (Some(db), Some(schema)) => (Some(db.as_str()), Some(schema.as_str())),
                (None, Some(schema)) => (scope.default_database, Some(schema.as_str())),
                (_, None) => (scope.default_database, scope.default_schema),
            };
            let database = database.map(str::to_lowercase);
            let schema = schema.map(str::to_lowercase);
            let table = table_ref.table.to_lowercase();

            if !scope.filter.include_table(
                database.as_deref().unwrap_or_default(),
                schema.as_deref().unwrap_or_default(),
                &table,
            ) {
                return None;
            }

            let id = DatasetLogicalId::new(
                scope.platform,
                scope.account,
                database.as_deref(),
                schema.as_deref(),
                &table,
            )
            .entity_id();

            seen.insert(id.clone()).then_some(QueriedDataset {
                id,
                database,
                schema,
                table,
            })
        })
        .collect()
}

/// Entity ids of the datasets a SQL text reads from.
///
/// Used for view definitions and dashboard queries; SQL that does not parse
/// yields no upstream.
pub fn sql_upstream(sql: &str, scope: &TableScope<'_>) -> Vec<String> {
    match extract_table_lineage(sql, scope.platform) {
        Ok(lineage) => resolve_table_refs(&lineage.sources, scope)
            .into_iter()
            .map(|dataset| dataset.id)
            .collect(),
        Err(e) => {
            debug!(error = %e, "Unable to parse SQL for upstream lineage");
            Vec::new()
        }
    }
}

/// SHA-256 hex digest of the SQL text
pub fn sql_hash(sql: &str) -> String {
    format!("{:x}", Sha256::digest(sql.as_bytes()))
}

/// Prefix of at most `max_chars` characters
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Group logs into `QueryLogs` entities of at most `per_batch` logs
pub fn into_batches(logs: Vec<QueryLog>, per_batch: usize) -> Vec<Entity> {
    let per_batch = per_batch.max(1);
    let mut batches = Vec::with_capacity(logs.len().div_ceil(per_batch));
    let mut current = Vec::with_capacity(per_batch.min(logs.len()));

    for log in logs {
        current.push(log);
        if current.len() == per_batch {
            batches.push(Entity::QueryLogs(QueryLogs {
                logs: std::mem::take(&mut current),
            }));
        }
    }
    if !current.is_empty() {
        batches.push(Entity::QueryLogs(QueryLogs { logs: current }));
    }
    batches
}

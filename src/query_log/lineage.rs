//! Table-level lineage from SQL text
//!
//! Walks the `sqlparser` AST by hand: targets come from INSERT, CREATE TABLE
//! and CREATE VIEW; sources from every FROM/JOIN relation reachable through
//! derived tables, expression subqueries (`IN`, `EXISTS`, scalar), nested
//! joins, set operations and CTE bodies.

use super::types::RawTableRef;
use crate::error::Result;
use crate::models::DataPlatform;
use crate::naming::split_identifier;
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, ObjectName, Query, SelectItem, SetExpr,
    Statement, TableFactor, TableObject, TableWithJoins,
};
use sqlparser::dialect::{
    BigQueryDialect, Dialect, DuckDbDialect, MySqlDialect, PostgreSqlDialect, RedshiftSqlDialect,
    SQLiteDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;
use std::collections::HashSet;

/// Tables read and written by a SQL text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLineage {
    pub sources: Vec<RawTableRef>,
    pub targets: Vec<RawTableRef>,
    /// Kind of the first statement (`SELECT`, `INSERT`, ...)
    pub statement_type: Option<String>,
}

impl TableLineage {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.targets.is_empty()
    }
}

fn dialect_for(platform: DataPlatform) -> Box<dyn Dialect + Send + Sync> {
    match platform {
        DataPlatform::Bigquery => Box::new(BigQueryDialect {}),
        DataPlatform::Duckdb => Box::new(DuckDbDialect {}),
        DataPlatform::Mysql => Box::new(MySqlDialect {}),
        DataPlatform::Postgresql => Box::new(PostgreSqlDialect {}),
        DataPlatform::Redshift => Box::new(RedshiftSqlDialect {}),
        DataPlatform::Snowflake => Box::new(SnowflakeDialect {}),
        DataPlatform::Sqlite => Box::new(SQLiteDialect {}),
    }
}

/// Parse `sql` in the platform's dialect and collect the tables it touches
pub fn extract_table_lineage(sql: &str, platform: DataPlatform) -> Result<TableLineage> {
    let dialect = dialect_for(platform);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)?;

    let mut collector = Collector::default();
    for statement in &statements {
        collector.statement(statement);
    }

    let statement_type = statements.first().map(statement_type);
    Ok(collector.finish(statement_type))
}

fn statement_type(statement: &Statement) -> String {
    match statement {
        Statement::Query(_) => "SELECT",
        Statement::Insert(_) => "INSERT",
        Statement::CreateTable(_) => "CREATE_TABLE",
        Statement::CreateView(_) => "CREATE_VIEW",
        _ => "OTHER",
    }
    .to_string()
}

#[derive(Default)]
struct Collector {
    sources: Vec<RawTableRef>,
    targets: Vec<RawTableRef>,
    ctes: HashSet<String>,
}

impl Collector {
    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Query(query) => self.query(query),
            Statement::Insert(insert) => {
                if let TableObject::TableName(name) = &insert.table {
                    push_unique(&mut self.targets, name);
                }
                if let Some(source) = &insert.source {
                    self.query(source);
                }
            }
            Statement::CreateTable(create) => {
                push_unique(&mut self.targets, &create.name);
                if let Some(query) = &create.query {
                    self.query(query);
                }
            }
            Statement::CreateView(create_view) => {
                push_unique(&mut self.targets, &create_view.name);
                self.query(&create_view.query);
            }
            _ => {}
        }
    }

    fn query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
                self.query(&cte.query);
            }
        }
        self.set_expr(&query.body);
    }

    fn set_expr(&mut self, set_expr: &SetExpr) {
        match set_expr {
            SetExpr::Select(select) => {
                for table_with_joins in &select.from {
                    self.table_with_joins(table_with_joins);
                }
                for item in &select.projection {
                    match item {
                        SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                            self.expr(expr);
                        }
                        _ => {}
                    }
                }
                for expr in select.selection.iter().chain(&select.having) {
                    self.expr(expr);
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left);
                self.set_expr(right);
            }
            SetExpr::Query(query) => self.query(query),
            _ => {}
        }
    }

    /// Subqueries nested anywhere inside an expression
    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => self.query(query),
            Expr::InSubquery { expr, subquery, .. } => {
                self.expr(expr);
                self.query(subquery);
            }
            Expr::BinaryOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::UnaryOp { expr, .. }
            | Expr::Nested(expr)
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::Cast { expr, .. } => self.expr(expr),
            Expr::InList { expr, list, .. } => {
                self.expr(expr);
                for item in list {
                    self.expr(item);
                }
            }
            Expr::Between { expr, low, high, .. } => {
                self.expr(expr);
                self.expr(low);
                self.expr(high);
            }
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                for expr in operand.iter().chain(else_result) {
                    self.expr(expr);
                }
                for when in conditions {
                    self.expr(&when.condition);
                    self.expr(&when.result);
                }
            }
            Expr::Function(function) => match &function.args {
                FunctionArguments::Subquery(query) => self.query(query),
                FunctionArguments::List(list) => {
                    for arg in &list.args {
                        let (FunctionArg::Named { arg, .. }
                        | FunctionArg::ExprNamed { arg, .. }
                        | FunctionArg::Unnamed(arg)) = arg;
                        if let FunctionArgExpr::Expr(expr) = arg {
                            self.expr(expr);
                        }
                    }
                }
                FunctionArguments::None => {}
            },
            _ => {}
        }
    }

    fn table_with_joins(&mut self, table_with_joins: &TableWithJoins) {
        self.table_factor(&table_with_joins.relation);
        for join in &table_with_joins.joins {
            self.table_factor(&join.relation);
        }
    }

    fn table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, .. } => push_unique(&mut self.sources, name),
            TableFactor::Derived { subquery, .. } => self.query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins),
            _ => {}
        }
    }

    fn finish(self, statement_type: Option<String>) -> TableLineage {
        let Collector {
            sources,
            targets,
            ctes,
        } = self;

        let sources = sources
            .into_iter()
            .filter(|source| {
                let is_cte = source.database.is_none()
                    && source.schema.is_none()
                    && ctes.contains(&source.table.to_lowercase());
                !is_cte && !targets.iter().any(|target| same_table(target, source))
            })
            .collect();

        TableLineage {
            sources,
            targets,
            statement_type,
        }
    }
}

fn same_table(a: &RawTableRef, b: &RawTableRef) -> bool {
    let eq = |x: &Option<String>, y: &Option<String>| match (x, y) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        (None, None) => true,
        _ => false,
    };
    a.table.eq_ignore_ascii_case(&b.table) && eq(&a.schema, &b.schema) && eq(&a.database, &b.database)
}

fn push_unique(refs: &mut Vec<RawTableRef>, name: &ObjectName) {
    let Some(table_ref) = to_table_ref(name) else {
        return;
    };
    if !refs.iter().any(|existing| same_table(existing, &table_ref)) {
        refs.push(table_ref);
    }
}

fn to_table_ref(name: &ObjectName) -> Option<RawTableRef> {
    let mut parts = split_identifier(&name.to_string());
    // `project.dataset.table` quoted as a single identifier
    if parts.len() == 1 && parts[0].contains('.') {
        parts = parts[0].split('.').map(String::from).collect();
    }
    let parts: Vec<Option<String>> = parts
        .into_iter()
        .map(|part| Some(part).filter(|p| !p.is_empty()))
        .collect();

    match parts.as_slice() {
        [.., database, schema, Some(table)] => Some(RawTableRef {
            database: database.clone(),
            schema: schema.clone(),
            table: table.clone(),
        }),
        [schema, Some(table)] => Some(RawTableRef {
            database: None,
            schema: schema.clone(),
            table: table.clone(),
        }),
        [Some(table)] => Some(RawTableRef {
            database: None,
            schema: None,
            table: table.clone(),
        }),
        _ => None,
    }
}

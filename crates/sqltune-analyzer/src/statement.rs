//! Statement classification and syntax-tree helpers
//!
//! Text-level classification of incoming statements (plannable or not),
//! the read-only safety gate for rewrites, and table-name extraction from
//! the statement's own syntax tree.

use sqlparser::ast::{
    Delete, FromTable, Query, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqltune_core::{Result, TuneError};

/// Statement types the planner cannot cost, with remediation hints
///
/// Leading-keyword match after comment stripping; anything here terminates
/// analysis immediately instead of wasting a round trip on EXPLAIN.
const NON_PLANNABLE: &[(&str, &str)] = &[
    (
        "copy",
        "COPY is a bulk-load command; tune the target table's indexes and run it during low-traffic windows",
    ),
    (
        "create",
        "DDL statements are not analyzable; submit the slow query that motivated this change instead",
    ),
    (
        "alter",
        "DDL statements are not analyzable; submit the slow query that motivated this change instead",
    ),
    (
        "drop",
        "DDL statements are not analyzable; submit the slow query that motivated this change instead",
    ),
    (
        "truncate",
        "TRUNCATE is already the fastest way to empty a table; no plan-level tuning applies",
    ),
    (
        "vacuum",
        "maintenance commands are governed by autovacuum settings, not query plans",
    ),
    (
        "analyze",
        "maintenance commands are governed by autovacuum settings, not query plans",
    ),
    (
        "reindex",
        "REINDEX rebuilds existing indexes; analyze the queries that use them instead",
    ),
    (
        "cluster",
        "CLUSTER is a physical reorganization; analyze the queries that motivated it instead",
    ),
];

/// Strips leading SQL comments (`--` and `/* */`) and whitespace
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(idx) => after[idx + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(idx) => after[idx + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// The lowercased leading keyword of a statement
pub fn leading_keyword(sql: &str) -> String {
    strip_leading_comments(sql)
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Rejects statement types that cannot be planned at all
///
/// Returns the statement's leading keyword on success so callers can log it.
pub fn classify_plannable(sql: &str) -> Result<String> {
    let keyword = leading_keyword(sql);
    if keyword.is_empty() {
        return Err(TuneError::Planning("empty statement".into()));
    }
    if let Some((kind, hint)) = NON_PLANNABLE.iter().find(|(kind, _)| *kind == keyword) {
        return Err(TuneError::UnsupportedStatement {
            kind: kind.to_string(),
            hint: hint.to_string(),
        });
    }
    Ok(keyword)
}

/// Rejects any replacement query containing a mutating construct
///
/// A rewrite is only eligible for plan-only costing when it is a pure read.
/// The check runs before any I/O: parse with the generic dialect and require
/// every parsed statement to be a query. Statements the parser does not
/// understand fall back to a leading-keyword allowlist, so dialect-specific
/// mutating statements (MERGE, CALL, ...) are rejected by construction.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let dialect = GenericDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => {
            if statements.is_empty() {
                return Err(TuneError::SafetyRejected(
                    "replacement query is empty".into(),
                ));
            }
            for statement in &statements {
                if !matches!(statement, Statement::Query(_)) {
                    return Err(TuneError::SafetyRejected(format!(
                        "replacement query contains a non-read statement starting with '{}'",
                        leading_keyword(&statement.to_string())
                    )));
                }
            }
            Ok(())
        }
        Err(_) => match leading_keyword(sql).as_str() {
            "select" | "with" | "values" | "table" => Ok(()),
            other => Err(TuneError::SafetyRejected(format!(
                "replacement query could not be parsed and starts with '{}'",
                other
            ))),
        },
    }
}

/// Extracts referenced table names from a statement's syntax tree
///
/// Schema-qualified names are kept qualified. CTE aliases are excluded;
/// they are not base tables. Unparsable statements yield an empty list,
/// leaving the schema context empty rather than failing the request.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let dialect = GenericDialect {};
    let statements = match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => statements,
        Err(e) => {
            tracing::debug!(error = %e, "statement not parsable, no table context");
            return Vec::new();
        }
    };

    let mut tables = Vec::new();
    let mut ctes = Vec::new();
    for statement in &statements {
        match statement {
            Statement::Query(query) => collect_query(query, &mut tables, &mut ctes),
            Statement::Insert(insert) => {
                push_table(&mut tables, &ctes, insert.table_name.to_string());
                if let Some(source) = &insert.source {
                    collect_query(source, &mut tables, &mut ctes);
                }
            }
            Statement::Update { table, .. } => {
                collect_table_with_joins(table, &mut tables, &mut ctes);
            }
            Statement::Delete(Delete {
                from, tables: t, ..
            }) => {
                for name in t {
                    push_table(&mut tables, &ctes, name.to_string());
                }
                let from_tables = match from {
                    FromTable::WithFromKeyword(tw) | FromTable::WithoutKeyword(tw) => tw,
                };
                for tw in from_tables {
                    collect_table_with_joins(tw, &mut tables, &mut ctes);
                }
            }
            _ => {}
        }
    }
    tables
}

fn collect_query(query: &Query, tables: &mut Vec<String>, ctes: &mut Vec<String>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            ctes.push(cte.alias.name.value.clone());
            collect_query(&cte.query, tables, ctes);
        }
    }
    collect_set_expr(&query.body, tables, ctes);
}

fn collect_set_expr(expr: &SetExpr, tables: &mut Vec<String>, ctes: &mut Vec<String>) {
    match expr {
        SetExpr::Select(select) => {
            for tw in &select.from {
                collect_table_with_joins(tw, tables, ctes);
            }
        }
        SetExpr::Query(query) => collect_query(query, tables, ctes),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr(left, tables, ctes);
            collect_set_expr(right, tables, ctes);
        }
        _ => {}
    }
}

fn collect_table_with_joins(tw: &TableWithJoins, tables: &mut Vec<String>, ctes: &mut Vec<String>) {
    collect_table_factor(&tw.relation, tables, ctes);
    for join in &tw.joins {
        collect_table_factor(&join.relation, tables, ctes);
    }
}

fn collect_table_factor(factor: &TableFactor, tables: &mut Vec<String>, ctes: &mut Vec<String>) {
    match factor {
        TableFactor::Table { name, .. } => {
            push_table(tables, ctes, name.to_string());
        }
        TableFactor::Derived { subquery, .. } => collect_query(subquery, tables, ctes),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_table_with_joins(table_with_joins, tables, ctes),
        _ => {}
    }
}

fn push_table(tables: &mut Vec<String>, ctes: &[String], name: String) {
    if ctes.iter().any(|cte| *cte == name) {
        return;
    }
    if !tables.contains(&name) {
        tables.push(name);
    }
}

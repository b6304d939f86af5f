//! Read-only inspection queries with guardrails.

use std::time::{Duration, Instant};

use ::duckdb::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::table::{read_query, Cell};
use crate::WarehouseError;

/// Guardrails for query execution to prevent resource exhaustion.
#[derive(Debug, Clone, Copy)]
pub struct QueryGuardrails {
    /// Maximum number of rows to return.
    pub max_rows: usize,
    /// Query timeout in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    fn timeout(self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    fn validate(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--max-rows must be greater than zero",
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--query-timeout-ms must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Column metadata for query results.
#[derive(Debug, Clone, Serialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

/// Result of an inspection query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    /// Whether rows were dropped because of `max_rows`.
    pub truncated: bool,
}

/// Run a single read-only statement against the store.
///
/// # Errors
/// Returns [`WarehouseError::QueryRejected`] for empty, writing, or
/// multi-statement SQL and invalid guardrails;
/// [`WarehouseError::QueryTimeout`] when the timeout elapses; and the store's
/// error if the statement fails.
pub fn execute_query(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
) -> Result<QueryResult, WarehouseError> {
    guardrails.validate()?;
    let sql = normalize_sql(sql)?;
    enforce_read_only_query(sql)?;

    let started = Instant::now();
    let outcome = read_query(connection, sql, Some(guardrails.max_rows))?;
    ensure_timeout(started, guardrails.timeout())?;

    let table = outcome.table;
    let columns = table
        .columns()
        .iter()
        .map(|column| SqlColumn {
            name: column.name.clone(),
            r#type: column.column_type.sql_type().to_string(),
        })
        .collect();
    let rows = table
        .rows()
        .iter()
        .map(|row| row.iter().map(Cell::to_json).collect())
        .collect::<Vec<Vec<Value>>>();

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        truncated: outcome.truncated,
    })
}

fn normalize_sql(sql: &str) -> Result<&str, WarehouseError> {
    let normalized = sql.trim().trim_end_matches(';').trim();
    if normalized.is_empty() {
        return Err(WarehouseError::QueryRejected(String::from(
            "query must not be empty",
        )));
    }
    Ok(normalized)
}

fn enforce_read_only_query(sql: &str) -> Result<(), WarehouseError> {
    if !is_select_like(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "only SELECT/CTE queries are allowed",
        )));
    }
    if sql.split(';').filter(|part| !part.trim().is_empty()).count() > 1 {
        return Err(WarehouseError::QueryRejected(String::from(
            "multiple SQL statements are not allowed",
        )));
    }
    Ok(())
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first_keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE"
    )
}

fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), WarehouseError> {
    if started.elapsed() > timeout {
        return Err(WarehouseError::QueryTimeout {
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        });
    }
    Ok(())
}

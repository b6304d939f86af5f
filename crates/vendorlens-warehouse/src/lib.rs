//! # Vendorlens Warehouse
//!
//! DuckDB-backed storage and analytics for vendor purchase and sales data.
//!
//! ## Overview
//!
//! This crate loads raw CSV exports into a single-file `DuckDB` store and
//! derives the `vendor_sales_summary` table from them.
//!
//! - **Loader**: [`load_all`] scans a directory and writes each CSV file into
//!   a table named after the file, replacing any previous version.
//! - **Summarizer**: [`build_vendor_summary`] joins purchases, prices, sales,
//!   and freight, cleans the result, and writes it back.
//! - **Inspection**: [`execute_query`] runs guarded read-only SQL.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vendorlens_warehouse::{build_vendor_summary, load_all, AccessMode, Store, WarehouseConfig};
//!
//! fn main() -> Result<(), vendorlens_warehouse::WarehouseError> {
//!     let config = WarehouseConfig::default();
//!     let store = Store::open(&config.db_path, AccessMode::ReadWrite)?;
//!
//!     let loaded = load_all(&config.data_dir, &store)?;
//!     println!("loaded {} tables", loaded.loaded.len());
//!
//!     let summary = build_vendor_summary(&store)?;
//!     println!("wrote {} summary rows", summary.rows_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `vendor_invoice` | Freight per purchase invoice |
//! | `purchases` | Purchase line items |
//! | `purchase_prices` | Reference volume and price per brand |
//! | `sales` | Sales transactions |
//! | `vendor_sales_summary` | Derived per vendor/brand profitability |

pub mod duckdb;
pub mod loader;
pub mod query;
pub mod summary;
pub mod table;

use std::env;
use std::path::PathBuf;

use ::duckdb::Connection;
use thiserror::Error;

pub use duckdb::{AccessMode, Store};
pub use loader::{ingest, load_all, parse_csv, LoadFailure, LoadReport, LoadedTable};
pub use query::{execute_query, QueryGuardrails, QueryResult, SqlColumn};
pub use summary::{
    build_vendor_summary, clean, summarize, summary_rows, SummaryReport, SummaryRow,
    SUMMARY_TABLE,
};
pub use table::{Cell, Column, ColumnType, Table};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error, including missing tables and columns.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed CSV input.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A table lacks a column the operation needs.
    #[error("schema mismatch: {0}")]
    Schema(String),

    /// A value cannot be represented in the target schema.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Query was rejected due to policy violation.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// Query execution timed out.
    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },
}

/// Locations used by a vendorlens run.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Base directory the other paths default under.
    pub home: PathBuf,
    /// Directory scanned for CSV files.
    pub data_dir: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Directory for component log files.
    pub log_dir: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let home = env_path("VENDORLENS_HOME").unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: env_path("VENDORLENS_DATA_DIR").unwrap_or_else(|| home.join("data")),
            db_path: env_path("VENDORLENS_DB").unwrap_or_else(|| home.join("inventory.duckdb")),
            log_dir: env_path("VENDORLENS_LOG_DIR").unwrap_or_else(|| home.join("logs")),
            home,
        }
    }
}

impl WarehouseConfig {
    /// Config rooted at `home` with the default layout, ignoring the environment.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            data_dir: home.join("data"),
            db_path: home.join("inventory.duckdb"),
            log_dir: home.join("logs"),
            home,
        }
    }
}

/// Read a non-empty path from the environment.
fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Finalize a transaction, committing on success or rolling back on failure.
pub(crate) fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_home_lays_out_default_paths() {
        let config = WarehouseConfig::with_home("/srv/inventory");

        assert_eq!(config.data_dir, PathBuf::from("/srv/inventory/data"));
        assert_eq!(config.db_path, PathBuf::from("/srv/inventory/inventory.duckdb"));
        assert_eq!(config.log_dir, PathBuf::from("/srv/inventory/logs"));
    }

    #[test]
    fn failed_transaction_is_rolled_back() {
        let connection = Connection::open_in_memory().expect("connection");
        connection
            .execute_batch("CREATE TABLE t (id INTEGER)")
            .expect("create");

        connection.execute_batch("BEGIN TRANSACTION").expect("begin");
        connection
            .execute_batch("INSERT INTO t VALUES (1)")
            .expect("insert");
        let result: Result<(), WarehouseError> =
            Err(WarehouseError::InvalidData(String::from("boom")));
        finalize_transaction(&connection, result).expect_err("propagates");

        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);
    }
}

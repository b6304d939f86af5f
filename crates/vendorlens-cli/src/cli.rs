//! CLI argument definitions for vendorlens.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingest` | Load every CSV file in the data directory into the store |
//! | `summarize` | Build the `vendor_sales_summary` table |
//! | `sql` | Run a read-only query against the store |
//!
//! Paths default to `$VENDORLENS_HOME` (or the working directory) and can be
//! overridden per run.
//!
//! # Examples
//!
//! ```bash
//! vendorlens ingest
//! vendorlens summarize --pretty
//! vendorlens sql "SELECT * FROM vendor_sales_summary LIMIT 10"
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vendorlens_warehouse::WarehouseConfig;

/// Vendor purchase and sales summary builder.
#[derive(Debug, Parser)]
#[command(
    name = "vendorlens",
    author,
    version,
    about = "Load inventory CSV exports into DuckDB and build a vendor sales summary"
)]
pub struct Cli {
    /// Path to the DuckDB database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Directory that receives the log files.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Pretty-print the JSON report.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Environment-derived config with command-line overrides applied.
    pub fn resolve_config(&self) -> WarehouseConfig {
        let mut config = WarehouseConfig::default();
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }
        if let Command::Ingest(IngestArgs {
            data_dir: Some(data_dir),
        }) = &self.command
        {
            config.data_dir = data_dir.clone();
        }
        config
    }
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load all CSV files from the data directory.
    ///
    /// Each file replaces the table named after it. Files that fail to load
    /// are reported and skipped.
    Ingest(IngestArgs),

    /// Build the vendor sales summary table from the loaded tables.
    Summarize,

    /// Run a read-only SQL query against the store.
    ///
    /// # Examples
    ///
    ///   vendorlens sql "SELECT VendorName, GrossProfit FROM vendor_sales_summary LIMIT 5"
    Sql(SqlArgs),
}

impl Command {
    /// Log file the command appends to.
    pub const fn log_file(&self) -> &'static str {
        match self {
            Self::Ingest(_) => "ingestion_db.log",
            Self::Summarize => "get_vendor_summary.log",
            Self::Sql(_) => "query.log",
        }
    }
}

/// Arguments for the `ingest` command.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Directory containing the CSV files.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

/// Arguments for the `sql` command.
#[derive(Debug, Args)]
pub struct SqlArgs {
    /// SQL query to execute.
    pub query: String,

    /// Maximum number of rows to return.
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    /// Query timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_overrides_data_dir_and_db() {
        let cli = Cli::parse_from([
            "vendorlens",
            "--db",
            "/tmp/store.duckdb",
            "ingest",
            "--data-dir",
            "/tmp/raw",
        ]);

        let config = cli.resolve_config();

        assert_eq!(config.db_path, PathBuf::from("/tmp/store.duckdb"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/raw"));
        assert_eq!(cli.command.log_file(), "ingestion_db.log");
    }

    #[test]
    fn summarize_takes_no_arguments() {
        let cli = Cli::parse_from(["vendorlens", "summarize"]);

        assert!(matches!(cli.command, Command::Summarize));
        assert_eq!(cli.command.log_file(), "get_vendor_summary.log");
    }

    #[test]
    fn sql_uses_default_guardrails() {
        let cli = Cli::parse_from(["vendorlens", "sql", "SELECT 1"]);

        let Command::Sql(args) = cli.command else {
            panic!("expected sql command");
        };
        assert_eq!(args.query, "SELECT 1");
        assert_eq!(args.max_rows, 10_000);
        assert_eq!(args.query_timeout_ms, 5_000);
    }
}

//! `DuckDB` store handle.

use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use ::duckdb::{AccessMode as DuckAccessMode, Config, Connection};

use crate::WarehouseError;

/// Access mode for a store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    ReadOnly,
    /// Read-write access.
    ReadWrite,
}

/// A single-owner connection to the store database file.
///
/// Opened once per run and passed by reference to every operation. The
/// underlying connection is closed when the handle is dropped.
pub struct Store {
    db_path: PathBuf,
    mode: AccessMode,
    connection: Connection,
}

impl Store {
    /// Open the database at `path`.
    ///
    /// In read-write mode the parent directory is created if missing. A
    /// read-only store must already exist and rejects every write.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The parent directory cannot be created
    /// - The database file cannot be opened
    /// - Connection configuration fails
    pub fn open(path: impl Into<PathBuf>, mode: AccessMode) -> Result<Self, WarehouseError> {
        let db_path = path.into();
        if mode == AccessMode::ReadWrite {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let connection = Connection::open_with_flags(db_path.as_path(), connection_config(mode)?)?;
        configure_connection(&connection)?;
        Ok(Self {
            db_path,
            mode,
            connection,
        })
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    /// Returns an error if `DuckDB` fails to initialize.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        let connection = Connection::open_in_memory()?;
        configure_connection(&connection)?;
        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            mode: AccessMode::ReadWrite,
            connection,
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Mode the store was opened with.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Check whether a table exists in the main schema.
    ///
    /// # Errors
    /// Returns an error if the catalog query fails.
    pub fn table_exists(&self, name: &str) -> Result<bool, WarehouseError> {
        let count: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Count the rows of a table.
    ///
    /// # Errors
    /// Returns an error if the table does not exist.
    pub fn row_count(&self, name: &str) -> Result<i64, WarehouseError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(name));
        let count = self
            .connection
            .query_row(sql.as_str(), [], |row| row.get(0))?;
        Ok(count)
    }
}

impl Deref for Store {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

/// Quote an identifier for inclusion in SQL.
///
/// Table and column names come verbatim from file names and CSV headers, so
/// they are always quoted.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Database open flags for the requested mode.
fn connection_config(mode: AccessMode) -> Result<Config, ::duckdb::Error> {
    let access_mode = match mode {
        AccessMode::ReadOnly => DuckAccessMode::ReadOnly,
        AccessMode::ReadWrite => DuckAccessMode::ReadWrite,
    };
    Config::default().access_mode(access_mode)
}

/// Configure a freshly opened connection.
fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

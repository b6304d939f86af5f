//! CSV discovery, parsing, and table replacement.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ::duckdb::{params_from_iter, Connection};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::duckdb::quote_identifier;
use crate::table::{Cell, Table};
use crate::{finalize_transaction, WarehouseError};

/// Field values treated as missing when parsing CSV files.
const NA_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

/// A table written by a batch load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedTable {
    pub table: String,
    pub file: String,
    pub rows: usize,
}

/// A file the batch load could not ingest.
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub file: String,
    pub message: String,
}

/// Outcome of [`load_all`].
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub started_at: String,
    pub directory: PathBuf,
    pub files_scanned: usize,
    pub loaded: Vec<LoadedTable>,
    pub failures: Vec<LoadFailure>,
    pub elapsed_secs: f64,
}

/// Write `table` into the store as `name`, replacing any table of that name.
///
/// Replacement and inserts happen in one transaction.
///
/// # Errors
/// Returns an error if the table has no columns or any statement fails. The
/// transaction is rolled back in that case.
pub fn ingest(table: &Table, name: &str, connection: &Connection) -> Result<(), WarehouseError> {
    if table.columns().is_empty() {
        return Err(WarehouseError::InvalidData(format!(
            "table '{name}' has no columns"
        )));
    }

    let quoted = quote_identifier(name);
    let definitions = table
        .columns()
        .iter()
        .map(|column| {
            format!(
                "{} {}",
                quote_identifier(&column.name),
                column.column_type.sql_type()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; table.columns().len()].join(", ");

    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = (|| -> Result<(), WarehouseError> {
        connection.execute_batch(&format!("CREATE OR REPLACE TABLE {quoted} ({definitions})"))?;

        let mut insert =
            connection.prepare(&format!("INSERT INTO {quoted} VALUES ({placeholders})"))?;
        for row in table.rows() {
            insert.execute(params_from_iter(row.iter()))?;
        }
        Ok(())
    })();
    finalize_transaction(connection, result)?;

    info!("Table '{name}' ingested successfully.");
    Ok(())
}

/// Parse a CSV file into a [`Table`].
///
/// The first record is the header. Each column is typed by its values:
/// integers, then floats, then text.
///
/// # Errors
/// Returns an error if the file cannot be read, a record has the wrong number
/// of fields, or the file has no header row.
pub fn parse_csv(path: &Path) -> Result<Table, WarehouseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)?;

    let names = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if names.is_empty() {
        return Err(WarehouseError::InvalidData(format!(
            "{} has no header row",
            path.display()
        )));
    }

    let mut raw = Vec::new();
    for record in reader.records() {
        let record = record?;
        raw.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let integer_columns = (0..names.len())
        .map(|index| {
            raw.iter()
                .map(|row| row[index].trim())
                .filter(|field| !is_missing(field))
                .all(|field| field.parse::<i64>().is_ok())
        })
        .collect::<Vec<_>>();

    let rows = raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&integer_columns)
                .map(|(field, integer)| parse_field(field, *integer))
                .collect()
        })
        .collect();

    Table::from_rows(names, rows)
}

/// Load every CSV file in `directory` into the store.
///
/// Files are processed in name order and each becomes a table named after
/// its file stem. A file that fails to parse or write is logged and recorded
/// in the report; the rest of the batch continues.
///
/// # Errors
/// Returns an error only if the directory itself cannot be read.
pub fn load_all(directory: &Path, connection: &Connection) -> Result<LoadReport, WarehouseError> {
    let started = Instant::now();
    let started_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    let mut files = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() && is_csv(path.as_path()) {
            files.push(path);
        }
    }
    files.sort();

    let mut report = LoadReport {
        run_id: Uuid::new_v4(),
        started_at,
        directory: directory.to_path_buf(),
        files_scanned: files.len(),
        loaded: Vec::new(),
        failures: Vec::new(),
        elapsed_secs: 0.0,
    };

    for path in files {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let table_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let outcome = parse_csv(path.as_path()).and_then(|table| {
            info!("Ingesting {file} into DB...");
            ingest(&table, &table_name, connection).map(|()| table.row_count())
        });

        match outcome {
            Ok(rows) => report.loaded.push(LoadedTable {
                table: table_name,
                file,
                rows,
            }),
            Err(err) => {
                error!("Error ingesting {file}: {err}");
                report.failures.push(LoadFailure {
                    file,
                    message: err.to_string(),
                });
            }
        }
    }

    let elapsed = started.elapsed();
    report.elapsed_secs = elapsed.as_secs_f64();
    info!("----------Ingestion Complete----------");
    info!("Total Time Taken: {:.2} minutes", elapsed.as_secs_f64() / 60.0);

    Ok(report)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"))
}

fn is_missing(field: &str) -> bool {
    NA_TOKENS.contains(&field.trim())
}

fn parse_field(field: String, integer_column: bool) -> Cell {
    if is_missing(&field) {
        return Cell::Null;
    }
    let trimmed = field.trim();
    if integer_column {
        if let Ok(value) = trimmed.parse::<i64>() {
            return Cell::Integer(value);
        }
    }
    match trimmed.parse::<f64>() {
        Ok(value) => Cell::Float(value),
        Err(_) => Cell::Text(field),
    }
}

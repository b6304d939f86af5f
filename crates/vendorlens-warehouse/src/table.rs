//! Typed in-memory tables.
//!
//! A [`Table`] is the unit the loader writes and the summarizer reads back:
//! named columns with a fixed [`ColumnType`], and rows of [`Cell`]s.

use ::duckdb::types::{TimeUnit, ToSql, ToSqlOutput, Value as DuckValue};
use ::duckdb::Connection;
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::WarehouseError;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl ColumnType {
    /// SQL type used when creating the column in the store.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE",
            Self::Text => "VARCHAR",
        }
    }

    /// The zero value missing cells are filled with.
    #[must_use]
    pub fn zero(self) -> Cell {
        match self {
            Self::Integer => Cell::Integer(0),
            Self::Float => Cell::Float(0.0),
            Self::Text => Cell::Text(String::from("0")),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the cell. Text is parsed after trimming.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Render the cell as display text (`Null` renders empty).
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    /// Convert to JSON; non-finite floats become `null`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Integer(value) => Value::Number(Number::from(*value)),
            Self::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(value) => Value::String(value.clone()),
        }
    }

    fn from_duck(value: DuckValue) -> Self {
        match value {
            DuckValue::Null => Self::Null,
            DuckValue::Boolean(value) => Self::Integer(i64::from(value)),
            DuckValue::TinyInt(value) => Self::Integer(i64::from(value)),
            DuckValue::SmallInt(value) => Self::Integer(i64::from(value)),
            DuckValue::Int(value) => Self::Integer(i64::from(value)),
            DuckValue::BigInt(value) => Self::Integer(value),
            // SUM over BIGINT yields HUGEINT.
            DuckValue::HugeInt(value) => {
                i64::try_from(value).map_or(Self::Float(value as f64), Self::Integer)
            }
            DuckValue::UTinyInt(value) => Self::Integer(i64::from(value)),
            DuckValue::USmallInt(value) => Self::Integer(i64::from(value)),
            DuckValue::UInt(value) => Self::Integer(i64::from(value)),
            DuckValue::UBigInt(value) => {
                i64::try_from(value).map_or(Self::Float(value as f64), Self::Integer)
            }
            DuckValue::Float(value) => Self::Float(f64::from(value)),
            DuckValue::Double(value) => Self::Float(value),
            DuckValue::Text(value) => Self::Text(value),
            DuckValue::Decimal(value) => value
                .to_string()
                .parse()
                .map_or_else(|_| Self::Text(value.to_string()), Self::Float),
            DuckValue::Date32(days) => OffsetDateTime::UNIX_EPOCH
                .checked_add(Duration::days(i64::from(days)))
                .map_or(Self::Null, |moment| Self::Text(moment.date().to_string())),
            DuckValue::Timestamp(unit, value) => OffsetDateTime::UNIX_EPOCH
                .checked_add(Duration::microseconds(to_micros(unit, value)))
                .and_then(|moment| moment.format(&Rfc3339).ok())
                .map_or(Self::Null, Self::Text),
            DuckValue::Blob(value) => Self::Text(hex::encode(value)),
            other => Self::Text(format!("{other:?}")),
        }
    }

    fn storage_type(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ColumnType::Integer),
            Self::Float(_) => Some(ColumnType::Float),
            Self::Text(_) => Some(ColumnType::Text),
        }
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> ::duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Null => DuckValue::Null,
            Self::Integer(value) => DuckValue::BigInt(*value),
            Self::Float(value) => DuckValue::Double(*value),
            Self::Text(value) => DuckValue::Text(value.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Text(value) => serializer.serialize_str(value),
        }
    }
}

/// Rows of typed cells under a fixed column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given columns.
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows, inferring each column's type from its values.
    ///
    /// Mixed columns widen Integer → Float → Text; columns with no values are
    /// Float, so an all-missing measure still aggregates.
    ///
    /// # Errors
    /// Returns [`WarehouseError::InvalidData`] if a row's width differs from
    /// the header's.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, WarehouseError> {
        let mut types: Vec<Option<ColumnType>> = vec![None; names.len()];
        for (index, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(WarehouseError::InvalidData(format!(
                    "row {index} has {} values, expected {}",
                    row.len(),
                    names.len()
                )));
            }
            for (slot, cell) in types.iter_mut().zip(row) {
                *slot = widen(*slot, cell.storage_type());
            }
        }

        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, column_type)| {
                Column::new(name, column_type.unwrap_or(ColumnType::Float))
            })
            .collect::<Vec<_>>();
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&columns)
                    .map(|(cell, column)| coerce(cell, column.column_type))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Append a row.
    ///
    /// # Errors
    /// Returns [`WarehouseError::InvalidData`] if the row width is wrong.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), WarehouseError> {
        if row.len() != self.columns.len() {
            return Err(WarehouseError::InvalidData(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Like [`Table::column_index`], failing with a schema error when absent.
    ///
    /// # Errors
    /// Returns [`WarehouseError::Schema`] if no column has that name.
    pub fn require_column(&self, name: &str) -> Result<usize, WarehouseError> {
        self.column_index(name)
            .ok_or_else(|| WarehouseError::Schema(format!("missing column '{name}'")))
    }

    /// The cell at `row` in the named column.
    #[must_use]
    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        let column = self.column_index(name)?;
        self.rows.get(row).and_then(|cells| cells.get(column))
    }

    /// Change a column's type, rewriting its cells with `convert`.
    ///
    /// # Errors
    /// Propagates the first conversion error.
    pub fn convert_column<F>(
        &mut self,
        index: usize,
        column_type: ColumnType,
        mut convert: F,
    ) -> Result<(), WarehouseError>
    where
        F: FnMut(Cell) -> Result<Cell, WarehouseError>,
    {
        for row in &mut self.rows {
            let cell = std::mem::replace(&mut row[index], Cell::Null);
            row[index] = convert(cell)?;
        }
        self.columns[index].column_type = column_type;
        Ok(())
    }

    /// Apply `update` to every cell of a column in place.
    pub fn update_column<F>(&mut self, index: usize, mut update: F)
    where
        F: FnMut(&mut Cell),
    {
        for row in &mut self.rows {
            update(&mut row[index]);
        }
    }

    /// Replace the named column's values, or append it if absent.
    ///
    /// # Errors
    /// Returns [`WarehouseError::InvalidData`] if `values` has the wrong length.
    pub fn set_column(
        &mut self,
        name: &str,
        column_type: ColumnType,
        values: Vec<Cell>,
    ) -> Result<(), WarehouseError> {
        if values.len() != self.rows.len() {
            return Err(WarehouseError::InvalidData(format!(
                "column '{name}' has {} values, table has {} rows",
                values.len(),
                self.rows.len()
            )));
        }

        match self.column_index(name) {
            Some(index) => {
                self.columns[index].column_type = column_type;
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                self.columns.push(Column::new(name, column_type));
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// A copy holding at most the first `count` rows.
    #[must_use]
    pub fn head(&self, count: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(count).cloned().collect(),
        }
    }

    /// Render as a plain-text grid for log previews.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(
            self.columns
                .iter()
                .map(|column| column.name.as_str())
                .collect::<Vec<_>>()
                .join(" | "),
        );
        for row in &self.rows {
            lines.push(row.iter().map(Cell::to_text).collect::<Vec<_>>().join(" | "));
        }
        lines.join("\n")
    }
}

/// Result of reading a query into a [`Table`].
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub table: Table,
    /// Whether rows were left unread because of the row limit.
    pub truncated: bool,
}

/// Run `sql` and collect its result set into a [`Table`].
///
/// Column types are inferred from the values read. With `max_rows`, reading
/// stops once the limit is reached and the outcome is marked truncated.
///
/// # Errors
/// Returns an error if the statement fails to prepare or execute.
pub fn read_query(
    connection: &Connection,
    sql: &str,
    max_rows: Option<usize>,
) -> Result<ReadOutcome, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    // Column metadata is only available once the statement has run.
    let _ = statement.query([])?;

    let column_count = statement.column_count();
    let mut names = Vec::with_capacity(column_count);
    for index in 0..column_count {
        names.push(statement.column_name(index)?.to_string());
    }

    let mut cursor = statement.query([])?;
    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = cursor.next()? {
        if max_rows.is_some_and(|limit| rows.len() >= limit) {
            truncated = true;
            break;
        }

        let mut cells = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let value: DuckValue = row.get(index)?;
            cells.push(Cell::from_duck(value));
        }
        rows.push(cells);
    }

    Ok(ReadOutcome {
        table: Table::from_rows(names, rows)?,
        truncated,
    })
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn widen(current: Option<ColumnType>, next: Option<ColumnType>) -> Option<ColumnType> {
    match (current, next) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) if a == b => Some(a),
        (Some(ColumnType::Text), _) | (_, Some(ColumnType::Text)) => Some(ColumnType::Text),
        _ => Some(ColumnType::Float),
    }
}

fn coerce(cell: Cell, column_type: ColumnType) -> Cell {
    match (cell, column_type) {
        (Cell::Integer(value), ColumnType::Float) => Cell::Float(value as f64),
        (Cell::Null, _) => Cell::Null,
        (cell @ Cell::Text(_), ColumnType::Text) => cell,
        (cell, ColumnType::Text) => Cell::Text(cell.to_text()),
        (cell, _) => cell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn from_rows_widens_mixed_numeric_columns_to_float() {
        let table = Table::from_rows(
            names(&["Brand", "Volume"]),
            vec![
                vec![Cell::Integer(1), Cell::Integer(750)],
                vec![Cell::Integer(2), Cell::Float(1.5)],
            ],
        )
        .expect("table");

        assert_eq!(table.columns()[0].column_type, ColumnType::Integer);
        assert_eq!(table.columns()[1].column_type, ColumnType::Float);
        assert_eq!(table.get(0, "Volume"), Some(&Cell::Float(750.0)));
    }

    #[test]
    fn from_rows_types_mixed_columns_as_text_and_empty_columns_as_float() {
        let table = Table::from_rows(
            names(&["Code", "Empty"]),
            vec![
                vec![Cell::Integer(7), Cell::Null],
                vec![Cell::Text(String::from("X7")), Cell::Null],
            ],
        )
        .expect("table");

        assert_eq!(table.columns()[0].column_type, ColumnType::Text);
        assert_eq!(table.columns()[1].column_type, ColumnType::Float);
        assert_eq!(table.get(0, "Code"), Some(&Cell::Text(String::from("7"))));
        assert_eq!(table.get(1, "Empty"), Some(&Cell::Null));
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let error = Table::from_rows(
            names(&["A", "B"]),
            vec![vec![Cell::Integer(1)]],
        )
        .expect_err("ragged row");

        assert!(matches!(error, WarehouseError::InvalidData(_)));
    }

    #[test]
    fn set_column_replaces_existing_values() {
        let mut table = Table::new(vec![Column::new("A", ColumnType::Integer)]);
        table.push_row(vec![Cell::Integer(1)]).expect("row");

        table
            .set_column("B", ColumnType::Float, vec![Cell::Float(2.0)])
            .expect("append");
        table
            .set_column("B", ColumnType::Float, vec![Cell::Float(3.0)])
            .expect("replace");

        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.get(0, "B"), Some(&Cell::Float(3.0)));
    }

    #[test]
    fn require_column_reports_missing_names() {
        let table = Table::new(vec![Column::new("A", ColumnType::Integer)]);
        let error = table.require_column("Volume").expect_err("missing");
        assert!(error.to_string().contains("Volume"));
    }

    #[test]
    fn non_finite_floats_serialize_as_null() {
        assert_eq!(Cell::Float(f64::INFINITY).to_json(), Value::Null);
        assert_eq!(Cell::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(
            serde_json::to_value(Cell::Text(String::from("B1"))).expect("json"),
            Value::String(String::from("B1"))
        );
    }

    #[test]
    fn read_query_collects_typed_cells() {
        let connection = Connection::open_in_memory().expect("connection");
        connection
            .execute_batch(
                "CREATE TABLE t (Brand VARCHAR, Qty BIGINT); \
                 INSERT INTO t VALUES ('B1', 2), ('B1', 3), ('B2', NULL);",
            )
            .expect("seed");

        let outcome = read_query(
            &connection,
            "SELECT Brand, SUM(Qty) AS Total FROM t GROUP BY Brand ORDER BY Brand",
            None,
        )
        .expect("read");

        assert!(!outcome.truncated);
        let table = outcome.table;
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(0, "Total"), Some(&Cell::Integer(5)));
        assert_eq!(table.get(1, "Total"), Some(&Cell::Null));
    }

    #[test]
    fn read_query_maps_decimal_and_temporal_values() {
        let connection = Connection::open_in_memory().expect("connection");

        let outcome = read_query(
            &connection,
            "SELECT 1.5 AS Price, DATE '2024-01-05' AS Day, \
             TIMESTAMP '2024-01-05 10:30:00' AS Moment",
            None,
        )
        .expect("read");

        let table = outcome.table;
        assert_eq!(table.columns()[0].column_type, ColumnType::Float);
        assert_eq!(table.get(0, "Price"), Some(&Cell::Float(1.5)));
        assert_eq!(table.get(0, "Day"), Some(&Cell::Text(String::from("2024-01-05"))));
        assert_eq!(
            table.get(0, "Moment"),
            Some(&Cell::Text(String::from("2024-01-05T10:30:00Z")))
        );
    }

    #[test]
    fn read_query_marks_truncation() {
        let connection = Connection::open_in_memory().expect("connection");
        let outcome =
            read_query(&connection, "SELECT * FROM range(10)", Some(3)).expect("read");

        assert!(outcome.truncated);
        assert_eq!(outcome.table.row_count(), 3);
    }
}

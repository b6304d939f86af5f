//! Vendor sales summary: aggregation, cleaning, and derived metrics.
//!
//! [`summarize`] joins the purchase, price, sales, and freight tables into one
//! row per purchase group. [`clean`] normalizes that result to the fixed
//! [`SUMMARY_SCHEMA`], zero-fills unmatched values, and derives profitability
//! columns. [`build_vendor_summary`] runs both and writes the result back.

use std::time::Instant;

use ::duckdb::Connection;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::loader::ingest;
use crate::table::{read_query, Cell, ColumnType, Table};
use crate::WarehouseError;

/// Table the cleaned summary is written to.
pub const SUMMARY_TABLE: &str = "vendor_sales_summary";

/// Rows shown in log previews and run reports.
const PREVIEW_ROWS: usize = 5;

// Join keys are compared as text: a source file whose key column had no
// values loads as DOUBLE and must still join against text keys.
const SUMMARY_SQL: &str = r"
WITH FreightSummary AS (
    SELECT VendorNumber, SUM(Freight) AS FreightCost
    FROM vendor_invoice
    GROUP BY VendorNumber
),
PurchaseSummary AS (
    SELECT p.VendorNumber, p.VendorName, p.Brand, p.Description,
           p.PurchasePrice, pp.Volume, pp.Price AS ActualPrice,
           SUM(p.Quantity) AS TotalPurchaseQuantity,
           SUM(p.Dollars) AS TotalPurchaseDollars
    FROM purchases p
    JOIN purchase_prices pp ON CAST(p.Brand AS VARCHAR) = CAST(pp.Brand AS VARCHAR)
    GROUP BY p.VendorNumber, p.VendorName, p.Brand, p.Description,
             p.PurchasePrice, pp.Volume, pp.Price
),
SalesSummary AS (
    SELECT VendorNo, Brand,
           SUM(SalesDollars) AS TotalSalesDollars,
           SUM(SalesPrice) AS TotalSalesPrice,
           SUM(SalesQuantity) AS TotalSalesQuantity,
           SUM(ExciseTax) AS TotalExciseTax
    FROM sales
    GROUP BY VendorNo, Brand
)
SELECT ps.VendorNumber, ps.VendorName, ps.Brand, ps.ActualPrice,
       ps.Description, ps.PurchasePrice, ps.Volume,
       ps.TotalPurchaseQuantity, ps.TotalPurchaseDollars,
       ss.TotalSalesQuantity, ss.TotalSalesDollars, ss.TotalSalesPrice,
       ss.TotalExciseTax, fs.FreightCost
FROM PurchaseSummary ps
LEFT JOIN SalesSummary ss
    ON CAST(ps.VendorNumber AS VARCHAR) = CAST(ss.VendorNo AS VARCHAR)
   AND CAST(ps.Brand AS VARCHAR) = CAST(ss.Brand AS VARCHAR)
LEFT JOIN FreightSummary fs
    ON CAST(ps.VendorNumber AS VARCHAR) = CAST(fs.VendorNumber AS VARCHAR)
ORDER BY ps.TotalPurchaseDollars DESC, ps.VendorNumber, ps.Brand
";

/// How [`clean`] treats a summary column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    /// Join key; keeps the type the store gave it.
    Key,
    /// Free text, whitespace-trimmed.
    Label,
    /// Numeric value, always stored as `DOUBLE`.
    Measure,
}

/// Columns the query must produce, in output order.
pub const SUMMARY_SCHEMA: &[(&str, SemanticType)] = &[
    ("VendorNumber", SemanticType::Key),
    ("VendorName", SemanticType::Label),
    ("Brand", SemanticType::Key),
    ("ActualPrice", SemanticType::Measure),
    ("Description", SemanticType::Label),
    ("PurchasePrice", SemanticType::Measure),
    ("Volume", SemanticType::Measure),
    ("TotalPurchaseQuantity", SemanticType::Measure),
    ("TotalPurchaseDollars", SemanticType::Measure),
    ("TotalSalesQuantity", SemanticType::Measure),
    ("TotalSalesDollars", SemanticType::Measure),
    ("TotalSalesPrice", SemanticType::Measure),
    ("TotalExciseTax", SemanticType::Measure),
    ("FreightCost", SemanticType::Measure),
];

/// Columns added by [`clean`].
pub const DERIVED_COLUMNS: &[&str] = &[
    "GrossProfit",
    "ProfitMargin",
    "StockTurnover",
    "SalesToPurchaseRatio",
];

/// One cleaned summary row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SummaryRow {
    pub vendor_number: Cell,
    pub vendor_name: String,
    pub brand: Cell,
    pub actual_price: f64,
    pub description: String,
    pub purchase_price: f64,
    pub volume: f64,
    pub total_purchase_quantity: f64,
    pub total_purchase_dollars: f64,
    pub total_sales_quantity: f64,
    pub total_sales_dollars: f64,
    pub total_sales_price: f64,
    pub total_excise_tax: f64,
    pub freight_cost: f64,
    pub gross_profit: f64,
    pub profit_margin: f64,
    pub stock_turnover: f64,
    pub sales_to_purchase_ratio: f64,
}

/// Outcome of [`build_vendor_summary`].
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub run_id: Uuid,
    pub started_at: String,
    pub table: String,
    pub rows_written: usize,
    pub elapsed_secs: f64,
    pub preview: Vec<SummaryRow>,
}

/// Run the vendor summary aggregation.
///
/// # Errors
/// Returns an error if a source table or column is missing.
pub fn summarize(connection: &Connection) -> Result<Table, WarehouseError> {
    Ok(read_query(connection, SUMMARY_SQL, None)?.table)
}

/// Normalize a raw summary, fill missing values, and derive metrics.
///
/// Division by a zero total yields an infinite or NaN metric.
///
/// # Errors
/// Returns [`WarehouseError::Schema`] if a summary column is absent and
/// [`WarehouseError::InvalidData`] if a measure holds non-numeric text.
pub fn clean(mut table: Table) -> Result<Table, WarehouseError> {
    for (name, semantic) in SUMMARY_SCHEMA {
        let index = table.require_column(name)?;
        if *semantic == SemanticType::Measure {
            table.convert_column(index, ColumnType::Float, |cell| to_measure(name, cell))?;
        }
    }

    for index in 0..table.columns().len() {
        let zero = table.columns()[index].column_type.zero();
        table.update_column(index, |cell| {
            if cell.is_null() {
                *cell = zero.clone();
            }
        });
    }

    for (name, semantic) in SUMMARY_SCHEMA {
        if *semantic == SemanticType::Label {
            let index = table.require_column(name)?;
            table.update_column(index, |cell| {
                if let Cell::Text(value) = cell {
                    let trimmed = value.trim();
                    if trimmed.len() != value.len() {
                        *value = trimmed.to_string();
                    }
                }
            });
        }
    }

    let sales_dollars = measure(&table, "TotalSalesDollars")?;
    let purchase_dollars = measure(&table, "TotalPurchaseDollars")?;
    let sales_quantity = measure(&table, "TotalSalesQuantity")?;
    let purchase_quantity = measure(&table, "TotalPurchaseQuantity")?;

    let gross_profit = sales_dollars
        .iter()
        .zip(&purchase_dollars)
        .map(|(sales, purchases)| sales - purchases)
        .collect::<Vec<_>>();
    let profit_margin = gross_profit
        .iter()
        .zip(&sales_dollars)
        .map(|(profit, sales)| profit / sales * 100.0)
        .collect::<Vec<_>>();
    let stock_turnover = sales_quantity
        .iter()
        .zip(&purchase_quantity)
        .map(|(sold, bought)| sold / bought)
        .collect::<Vec<_>>();
    let sales_to_purchase = sales_dollars
        .iter()
        .zip(&purchase_dollars)
        .map(|(sales, purchases)| sales / purchases)
        .collect::<Vec<_>>();

    for (name, values) in DERIVED_COLUMNS.iter().zip([
        gross_profit,
        profit_margin,
        stock_turnover,
        sales_to_purchase,
    ]) {
        let cells = values.into_iter().map(Cell::Float).collect();
        table.set_column(name, ColumnType::Float, cells)?;
    }

    Ok(table)
}

/// Extract typed rows from a cleaned summary table.
///
/// # Errors
/// Returns [`WarehouseError::Schema`] if the table was not produced by
/// [`clean`].
pub fn summary_rows(table: &Table) -> Result<Vec<SummaryRow>, WarehouseError> {
    let index = |name: &str| table.require_column(name);
    let vendor_number = index("VendorNumber")?;
    let vendor_name = index("VendorName")?;
    let brand = index("Brand")?;
    let actual_price = index("ActualPrice")?;
    let description = index("Description")?;
    let purchase_price = index("PurchasePrice")?;
    let volume = index("Volume")?;
    let total_purchase_quantity = index("TotalPurchaseQuantity")?;
    let total_purchase_dollars = index("TotalPurchaseDollars")?;
    let total_sales_quantity = index("TotalSalesQuantity")?;
    let total_sales_dollars = index("TotalSalesDollars")?;
    let total_sales_price = index("TotalSalesPrice")?;
    let total_excise_tax = index("TotalExciseTax")?;
    let freight_cost = index("FreightCost")?;
    let gross_profit = index("GrossProfit")?;
    let profit_margin = index("ProfitMargin")?;
    let stock_turnover = index("StockTurnover")?;
    let sales_to_purchase_ratio = index("SalesToPurchaseRatio")?;

    let number = |cell: &Cell| cell.as_f64().unwrap_or(f64::NAN);

    Ok(table
        .rows()
        .iter()
        .map(|row| SummaryRow {
            vendor_number: row[vendor_number].clone(),
            vendor_name: row[vendor_name].to_text(),
            brand: row[brand].clone(),
            actual_price: number(&row[actual_price]),
            description: row[description].to_text(),
            purchase_price: number(&row[purchase_price]),
            volume: number(&row[volume]),
            total_purchase_quantity: number(&row[total_purchase_quantity]),
            total_purchase_dollars: number(&row[total_purchase_dollars]),
            total_sales_quantity: number(&row[total_sales_quantity]),
            total_sales_dollars: number(&row[total_sales_dollars]),
            total_sales_price: number(&row[total_sales_price]),
            total_excise_tax: number(&row[total_excise_tax]),
            freight_cost: number(&row[freight_cost]),
            gross_profit: number(&row[gross_profit]),
            profit_margin: number(&row[profit_margin]),
            stock_turnover: number(&row[stock_turnover]),
            sales_to_purchase_ratio: number(&row[sales_to_purchase_ratio]),
        })
        .collect())
}

/// Summarize, clean, and write the result to [`SUMMARY_TABLE`].
///
/// # Errors
/// Any failure is fatal to the run: missing source tables, schema mismatches,
/// and write errors are all returned.
pub fn build_vendor_summary(connection: &Connection) -> Result<SummaryReport, WarehouseError> {
    let started = Instant::now();
    let started_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    info!("Creating Vendor Summary Table...");
    let summary = summarize(connection)?;
    info!("\n{}", summary.head(PREVIEW_ROWS).render());

    info!("Cleaning Data...");
    let summary = clean(summary)?;
    let preview = summary.head(PREVIEW_ROWS);
    info!("\n{}", preview.render());

    info!("Ingesting data...");
    ingest(&summary, SUMMARY_TABLE, connection)?;
    debug!(rows = summary.row_count(), table = SUMMARY_TABLE, "summary written");
    info!("Completed");

    Ok(SummaryReport {
        run_id: Uuid::new_v4(),
        started_at,
        table: SUMMARY_TABLE.to_string(),
        rows_written: summary.row_count(),
        elapsed_secs: started.elapsed().as_secs_f64(),
        preview: summary_rows(&preview)?,
    })
}

fn to_measure(column: &str, cell: Cell) -> Result<Cell, WarehouseError> {
    match cell {
        Cell::Null => Ok(Cell::Null),
        Cell::Float(value) => Ok(Cell::Float(value)),
        Cell::Integer(value) => Ok(Cell::Float(value as f64)),
        Cell::Text(value) => value.trim().parse().map(Cell::Float).map_err(|_| {
            WarehouseError::InvalidData(format!(
                "column '{column}' holds non-numeric value '{value}'"
            ))
        }),
    }
}

fn measure(table: &Table, name: &str) -> Result<Vec<f64>, WarehouseError> {
    let index = table.require_column(name)?;
    Ok(table
        .rows()
        .iter()
        .map(|row| row[index].as_f64().unwrap_or(0.0))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    fn seed(connection: &Connection, sales: &str) {
        connection
            .execute_batch(&format!(
                "CREATE TABLE vendor_invoice (VendorNumber VARCHAR, Freight DOUBLE);
                 INSERT INTO vendor_invoice VALUES ('V1', 4.0), ('V1', 6.0);
                 CREATE TABLE purchases (VendorNumber VARCHAR, VendorName VARCHAR, Brand VARCHAR,
                     Description VARCHAR, PurchasePrice DOUBLE, Quantity BIGINT, Dollars DOUBLE);
                 INSERT INTO purchases VALUES
                     ('V1', 'Acme  ', 'B1', ' widget', 5.0, 2, 10.0),
                     ('V2', 'Bolt', 'B2', 'gadget', 1.0, 4, 4.0),
                     ('V2', 'Bolt', 'B9', 'orphan', 1.0, 1, 1.0);
                 CREATE TABLE purchase_prices (Brand VARCHAR, Volume VARCHAR, Price DOUBLE);
                 INSERT INTO purchase_prices VALUES ('B1', '100', 6.0), ('B2', '750', 2.0);
                 CREATE TABLE sales (VendorNo VARCHAR, Brand VARCHAR, SalesDollars DOUBLE,
                     SalesPrice DOUBLE, SalesQuantity BIGINT, ExciseTax DOUBLE);
                 {sales}"
            ))
            .expect("seed tables");
    }

    #[test]
    fn summarize_inner_joins_prices_and_left_joins_sales_and_freight() {
        let connection = Connection::open_in_memory().expect("connection");
        seed(
            &connection,
            "INSERT INTO sales VALUES ('V1', 'B1', 12.0, 4.0, 1, 0.5), ('V1', 'B1', 8.0, 4.0, 2, 0.5);",
        );

        let table = summarize(&connection).expect("summarize");

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(0, "VendorNumber"), Some(&text("V1")));
        assert_eq!(table.get(0, "TotalSalesDollars"), Some(&Cell::Float(20.0)));
        assert_eq!(table.get(0, "TotalSalesQuantity"), Some(&Cell::Integer(3)));
        assert_eq!(table.get(0, "FreightCost"), Some(&Cell::Float(10.0)));
        assert_eq!(table.get(1, "Brand"), Some(&text("B2")));
        assert_eq!(table.get(1, "TotalSalesDollars"), Some(&Cell::Null));
        assert_eq!(table.get(1, "FreightCost"), Some(&Cell::Null));
    }

    #[test]
    fn clean_fills_trims_casts_and_derives() {
        let connection = Connection::open_in_memory().expect("connection");
        seed(
            &connection,
            "INSERT INTO sales VALUES ('V1', 'B1', 20.0, 8.0, 3, 1.0);",
        );

        let table = clean(summarize(&connection).expect("summarize")).expect("clean");
        let rows = summary_rows(&table).expect("rows");

        let first = &rows[0];
        assert_eq!(first.vendor_name, "Acme");
        assert_eq!(first.description, "widget");
        assert_eq!(first.volume, 100.0);
        assert_eq!(first.gross_profit, 10.0);
        assert_eq!(first.profit_margin, 50.0);
        assert_eq!(first.stock_turnover, 1.5);
        assert_eq!(first.sales_to_purchase_ratio, 2.0);

        let second = &rows[1];
        assert_eq!(second.total_sales_dollars, 0.0);
        assert_eq!(second.freight_cost, 0.0);
        assert_eq!(second.gross_profit, -4.0);
        assert!(second.profit_margin.is_infinite());
        assert_eq!(second.stock_turnover, 0.0);

        let volume = table.require_column("Volume").expect("volume");
        assert_eq!(table.columns()[volume].column_type, ColumnType::Float);
        assert!(table.rows().iter().flatten().all(|cell| !cell.is_null()));
    }

    #[test]
    fn clean_is_idempotent() {
        let connection = Connection::open_in_memory().expect("connection");
        seed(
            &connection,
            "INSERT INTO sales VALUES ('V2', 'B2', 6.0, 1.5, 2, 0.1);",
        );

        let once = clean(summarize(&connection).expect("summarize")).expect("clean");
        let twice = clean(once.clone()).expect("clean again");

        assert_eq!(once.columns(), twice.columns());
        assert_eq!(
            summary_rows(&once).expect("rows"),
            summary_rows(&twice).expect("rows")
        );
    }

    #[test]
    fn clean_rejects_missing_columns() {
        let table = Table::new(vec![Column::new("VendorNumber", ColumnType::Integer)]);

        let error = clean(table).expect_err("schema");

        assert!(matches!(error, WarehouseError::Schema(_)));
    }

    #[test]
    fn clean_rejects_non_numeric_volume() {
        let connection = Connection::open_in_memory().expect("connection");
        seed(&connection, "");
        connection
            .execute_batch("UPDATE purchase_prices SET Volume = 'Unknown' WHERE Brand = 'B2'")
            .expect("update");

        let error = clean(summarize(&connection).expect("summarize")).expect_err("volume");

        assert!(matches!(error, WarehouseError::InvalidData(_)));
    }

    #[test]
    fn summarize_fails_when_a_source_table_is_missing() {
        let connection = Connection::open_in_memory().expect("connection");

        let error = summarize(&connection).expect_err("missing tables");

        assert!(matches!(error, WarehouseError::DuckDb(_)));
    }

    #[test]
    fn build_vendor_summary_replaces_the_summary_table() {
        let connection = Connection::open_in_memory().expect("connection");
        seed(&connection, "");
        connection
            .execute_batch("CREATE TABLE vendor_sales_summary (stale INTEGER)")
            .expect("stale table");

        let report = build_vendor_summary(&connection).expect("build");

        assert_eq!(report.rows_written, 2);
        assert_eq!(report.table, SUMMARY_TABLE);
        assert_eq!(report.preview.len(), 2);
        let rows: i64 = connection
            .query_row("SELECT COUNT(*) FROM vendor_sales_summary", [], |row| {
                row.get(0)
            })
            .expect("count");
        assert_eq!(rows, 2);
        let turnover_is_nan: bool = connection
            .query_row(
                "SELECT isnan(StockTurnover) FROM vendor_sales_summary WHERE Brand = 'B1'",
                [],
                |row| row.get(0),
            )
            .expect("turnover");
        assert!(!turnover_is_nan);
    }
}

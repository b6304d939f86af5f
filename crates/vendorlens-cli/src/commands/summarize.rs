//! Build the vendor sales summary table.

use serde_json::Value;
use tracing::info;
use vendorlens_warehouse::{build_vendor_summary, AccessMode, Store, WarehouseConfig};

use crate::error::CliError;

pub fn run(config: &WarehouseConfig) -> Result<Value, CliError> {
    let store = Store::open(&config.db_path, AccessMode::ReadWrite)?;
    let report = build_vendor_summary(&store)?;
    info!(
        run_id = %report.run_id,
        rows = report.rows_written,
        elapsed_secs = report.elapsed_secs,
        "vendor summary built"
    );
    Ok(serde_json::to_value(report)?)
}

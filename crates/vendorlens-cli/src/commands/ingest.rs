//! Load raw CSV exports into the store.

use serde_json::Value;
use tracing::{info, warn};
use vendorlens_warehouse::{load_all, AccessMode, Store, WarehouseConfig};

use crate::error::CliError;

pub fn run(config: &WarehouseConfig) -> Result<Value, CliError> {
    let store = Store::open(&config.db_path, AccessMode::ReadWrite)?;
    info!(
        data_dir = %config.data_dir.display(),
        db = %store.db_path().display(),
        "starting ingestion"
    );

    let report = load_all(&config.data_dir, &store)?;
    if !report.failures.is_empty() {
        warn!(
            failed = report.failures.len(),
            loaded = report.loaded.len(),
            "ingestion finished with failures"
        );
    }

    Ok(serde_json::to_value(report)?)
}

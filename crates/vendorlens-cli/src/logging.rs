//! Per-command log files.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Level used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "debug";

/// Send `tracing` output to `<log_dir>/<file_name>`, appending to any
/// existing log.
pub fn init(log_dir: &Path, file_name: &str) -> Result<(), CliError> {
    fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(file_name))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|error| CliError::Logging(error.to_string()))
}

mod ingest;
mod sql;
mod summarize;

use serde_json::Value;
use vendorlens_warehouse::WarehouseConfig;

use crate::cli::Command;
use crate::error::CliError;

/// Dispatch a command and return its JSON report.
pub fn run(command: &Command, config: &WarehouseConfig) -> Result<Value, CliError> {
    match command {
        Command::Ingest(_) => ingest::run(config),
        Command::Summarize => summarize::run(config),
        Command::Sql(args) => sql::run(args, config),
    }
}

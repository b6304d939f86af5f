use serde_json::Value;
use tracing::debug;
use vendorlens_warehouse::{execute_query, AccessMode, QueryGuardrails, Store, WarehouseConfig};

use crate::cli::SqlArgs;
use crate::error::CliError;

pub fn run(args: &SqlArgs, config: &WarehouseConfig) -> Result<Value, CliError> {
    let store = Store::open(&config.db_path, AccessMode::ReadOnly)?;
    let guardrails = QueryGuardrails {
        max_rows: args.max_rows,
        query_timeout_ms: args.query_timeout_ms,
    };

    debug!(query = %args.query, "executing read-only query");
    let result = execute_query(&store, &args.query, guardrails)?;
    if result.truncated {
        debug!(rows = result.row_count, "result truncated at --max-rows");
    }

    Ok(serde_json::to_value(result)?)
}

use std::time::Duration;

use pricebook_warehouse::{QueryPolicy, RecordStore, WarehouseError};
use serde_json::Value;

use crate::cli::SqlArgs;
use crate::error::CliError;

pub async fn run(args: &SqlArgs, store: &dyn RecordStore) -> Result<Value, CliError> {
    let policy = policy(args)?;

    let result = store
        .execute_query(&args.query, policy)
        .await
        .map_err(|error| match error {
            WarehouseError::ReadOnlyViolation { keyword } => CliError::Command(format!(
                "{keyword} changes data; pass --write to run it"
            )),
            other => CliError::Storage(other),
        })?;

    if result.truncated {
        tracing::warn!(
            engine = %store.engine(),
            rows = result.row_count,
            "result truncated (use --max-rows to increase limit)"
        );
    }
    Ok(serde_json::to_value(result)?)
}

fn policy(args: &SqlArgs) -> Result<QueryPolicy, CliError> {
    if args.max_rows == 0 {
        return Err(CliError::Command(String::from(
            "--max-rows must be greater than zero",
        )));
    }
    if args.query_timeout_ms == 0 {
        return Err(CliError::Command(String::from(
            "--query-timeout-ms must be greater than zero",
        )));
    }

    let access = if args.write {
        QueryPolicy::read_write()
    } else {
        QueryPolicy::read_only()
    };
    Ok(access
        .with_max_rows(args.max_rows)
        .with_timeout(Duration::from_millis(args.query_timeout_ms)))
}

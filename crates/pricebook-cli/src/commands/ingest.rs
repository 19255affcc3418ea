use std::sync::Arc;

use pricebook_core::{IngestionJob, ReqwestHttpClient, Settings};
use serde_json::Value;

use crate::cli::IngestArgs;
use crate::error::CliError;

use super::store;

pub async fn run(args: &IngestArgs, settings: &Settings) -> Result<Value, CliError> {
    let credential_path = args
        .api_key_path
        .clone()
        .unwrap_or_else(|| settings.api_key_path.clone());
    let timeout_ms = args.timeout_ms.unwrap_or(settings.http_timeout_ms);

    let job = IngestionJob::new(
        store(settings).await?,
        Arc::new(ReqwestHttpClient::new()),
        credential_path,
    )
    .with_timeout_ms(timeout_ms);

    let report = job.run().await?;
    Ok(serde_json::to_value(report)?)
}

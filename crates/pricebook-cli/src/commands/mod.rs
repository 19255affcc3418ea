mod ingest;
mod list;
mod serve;
mod sql;
mod stats;

use std::sync::Arc;

use pricebook_core::{QueryService, Settings};
use pricebook_warehouse::{open_store, RecordStore};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Run the selected command. Commands with a result return it for printing.
pub async fn run(cli: &Cli) -> Result<Option<Value>, CliError> {
    let mut settings = Settings::from_env()?;
    if let Some(engine) = cli.engine {
        settings.store.engine = engine.into();
    }

    match &cli.command {
        Command::Serve(args) => {
            serve::run(args, &settings).await?;
            Ok(None)
        }
        Command::Ingest(args) => ingest::run(args, &settings).await.map(Some),
        Command::List(args) => list::run(args, &query_service(&settings).await?).await.map(Some),
        Command::Stats(args) => stats::run(args, &query_service(&settings).await?).await.map(Some),
        Command::Sql(args) => {
            let store = store(&settings).await?;
            sql::run(args, store.as_ref()).await.map(Some)
        }
    }
}

async fn store(settings: &Settings) -> Result<Arc<dyn RecordStore>, CliError> {
    Ok(open_store(&settings.store).await?)
}

async fn query_service(settings: &Settings) -> Result<QueryService, CliError> {
    Ok(QueryService::new(store(settings).await?).with_page_size(settings.max_bulk_operations))
}

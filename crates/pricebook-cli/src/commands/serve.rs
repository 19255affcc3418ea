use std::sync::Arc;

use pricebook_core::Settings;
use pricebook_web::AppState;

use crate::cli::ServeArgs;
use crate::error::CliError;

use super::query_service;

pub async fn run(args: &ServeArgs, settings: &Settings) -> Result<(), CliError> {
    let port = args.port.unwrap_or(settings.server_port);
    let state = AppState {
        query: Arc::new(query_service(settings).await?),
    };

    tracing::info!(
        port,
        engine = %settings.store.engine,
        env = ?settings.app_env,
        "starting pricebook api"
    );
    pricebook_web::serve(state, port, &settings.allowed_hosts).await?;
    Ok(())
}

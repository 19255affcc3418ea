//! # Pricebook Web
//!
//! HTTP surface over the query service.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /api/financial_data` | Paginated records; `start_date`, `end_date`, `symbol`, `limit` (5), `page` (1) |
//! | `GET /api/statistics` | Average daily prices and volume; `start_date`, `end_date`, `symbol` all required |
//! | `GET /api/health` | Liveness |
//!
//! Every response is `{ "data": ..., "info": { "error": "" } }`; listings add
//! `pagination`. Failures carry `data: null` and a message in `info.error`.

pub mod error;
pub mod handlers;
pub mod response;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use pricebook_core::QueryService;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
}

impl FromRef<AppState> for Arc<QueryService> {
    fn from_ref(state: &AppState) -> Arc<QueryService> {
        Arc::clone(&state.query)
    }
}

/// Build the API router. `allowed_hosts` containing `*` allows any origin.
pub fn router(state: AppState, allowed_hosts: &[String]) -> Router {
    Router::new()
        .route("/api/financial_data", get(handlers::list_financial_data))
        .route("/api/statistics", get(handlers::get_statistics))
        .route("/api/health", get(handlers::health))
        .layer(cors_layer(allowed_hosts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_hosts: &[String]) -> CorsLayer {
    let origins = if allowed_hosts.iter().any(|host| host == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = allowed_hosts
            .iter()
            .filter_map(|host| match host.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(host = %host, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

/// Bind `0.0.0.0:port` and serve until Ctrl-C.
pub async fn serve(state: AppState, port: u16, allowed_hosts: &[String]) -> std::io::Result<()> {
    let app = router(state, allowed_hosts);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("registering routes:");
    tracing::info!("  GET /api/financial_data?start_date&end_date&symbol&limit&page");
    tracing::info!("  GET /api/statistics?start_date&end_date&symbol");
    tracing::info!("  GET /api/health");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

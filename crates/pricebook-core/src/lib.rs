//! # Pricebook Core
//!
//! Domain model, market-data ingestion and query services for pricebook.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Alpha Vantage daily time-series client |
//! | [`cache`] | TTL memoization for statistics |
//! | [`config`] | Settings resolved from the environment |
//! | [`domain`] | `Symbol`, `FinancialRecord`, date/time helpers |
//! | [`error`] | Validation, query, ingestion and configuration errors |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`ingest`] | Ingestion job |
//! | [`logging`] | Call logging around service operations |
//! | [`query`] | Paginated listing and statistics |
//! | [`statistics`] | Streaming mean accumulator |
//! | [`throttling`] | Outbound call budget |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pricebook_core::{ListRequest, QueryService, Settings};
//! use pricebook_warehouse::open_store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let store = open_store(&settings.store).await?;
//!     let service = QueryService::new(store).with_page_size(settings.max_bulk_operations);
//!
//!     let page = service.list(&ListRequest::default()).await?;
//!     println!("{} records", page.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use pricebook_core::QueryError;
//!
//! fn describe(error: &QueryError) -> String {
//!     match error {
//!         QueryError::PageOutOfBounds { requested, max } => {
//!             format!("page {requested} requested, last page is {max}")
//!         }
//!         other => other.to_string(),
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! The Alpha Vantage key is read from a file and never logged or printed.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod ingest;
pub mod logging;
pub mod query;
pub mod statistics;
pub mod throttling;

pub use adapters::{AlphaVantageClient, ApiKey};
pub use config::{AppEnv, Settings};
pub use domain::{format_date, parse_date, FinancialRecord, Symbol, UtcDateTime};
pub use error::{
    ConfigError, IngestError, QueryError, SourceError, SourceErrorKind, ValidationError,
};
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use ingest::{IngestionJob, IngestionReport, SymbolIngest};
pub use query::{ListRequest, QueryService, RecordPage, StatisticsRequest};
pub use statistics::{MeanAccumulator, Statistics};
pub use throttling::RateBudget;

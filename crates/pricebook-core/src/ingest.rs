//! Ingestion job: pull recent daily prices and upsert them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pricebook_warehouse::{EntityTable, RecordStore};
use serde::Serialize;
use time::Date;
use uuid::Uuid;

use crate::adapters::{AlphaVantageClient, ApiKey};
use crate::http_client::HttpClient;
use crate::throttling::RateBudget;
use crate::{logging, IngestError, Symbol, UtcDateTime};

/// Rows written for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SymbolIngest {
    pub symbol: Symbol,
    pub rows_written: usize,
    pub batches_committed: usize,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub symbols: Vec<SymbolIngest>,
}

impl IngestionReport {
    pub fn rows_written(&self) -> usize {
        self.symbols.iter().map(|s| s.rows_written).sum()
    }
}

/// Fetches every tracked symbol and upserts each symbol's records in one call.
pub struct IngestionJob {
    store: Arc<dyn RecordStore>,
    http_client: Arc<dyn HttpClient>,
    credential_path: PathBuf,
    budget: RateBudget,
    timeout_ms: u64,
    base_url: Option<String>,
}

impl IngestionJob {
    pub fn new(
        store: Arc<dyn RecordStore>,
        http_client: Arc<dyn HttpClient>,
        credential_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            http_client,
            credential_path: credential_path.into(),
            budget: RateBudget::alphavantage_free_tier(),
            timeout_ms: crate::config::DEFAULT_HTTP_TIMEOUT_MS,
            base_url: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_budget(mut self, budget: RateBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Run against the current UTC date.
    pub async fn run(&self) -> Result<IngestionReport, IngestError> {
        self.run_for(UtcDateTime::now().date()).await
    }

    /// Run with the lookback window ending at `today`.
    ///
    /// The first failure aborts the run; symbols already upserted stay written.
    pub async fn run_for(&self, today: Date) -> Result<IngestionReport, IngestError> {
        logging::instrumented("ingest_financial_data", self.run_inner(today)).await
    }

    async fn run_inner(&self, today: Date) -> Result<IngestionReport, IngestError> {
        let api_key = read_api_key(&self.credential_path).await?;
        let mut client = AlphaVantageClient::new(Arc::clone(&self.http_client), api_key)
            .with_timeout_ms(self.timeout_ms)
            .with_budget(self.budget.clone());
        if let Some(base_url) = &self.base_url {
            client = client.with_base_url(base_url.clone());
        }

        let run_id = Uuid::new_v4();
        let table = EntityTable::financial_data();
        let mut symbols = Vec::with_capacity(Symbol::ALL.len());

        for symbol in Symbol::ALL {
            let updated_at = UtcDateTime::now();
            let records = client.fetch_recent_days(symbol, today, updated_at).await?;
            let rows = records.iter().map(|record| record.to_row()).collect();
            let report = self.store.bulk_upsert(table, rows).await?;

            tracing::info!(
                run_id = %run_id,
                symbol = %symbol,
                rows = report.rows_written,
                batches = report.batches_committed,
                "symbol ingested"
            );
            symbols.push(SymbolIngest {
                symbol,
                rows_written: report.rows_written,
                batches_committed: report.batches_committed,
            });
        }

        Ok(IngestionReport { run_id, symbols })
    }
}

async fn read_api_key(path: &Path) -> Result<ApiKey, IngestError> {
    let not_found = || IngestError::CredentialNotFound {
        path: path.to_path_buf(),
    };
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "api key file unreadable");
        not_found()
    })?;
    ApiKey::new(raw).ok_or_else(not_found)
}

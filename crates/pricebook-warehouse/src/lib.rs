//! # Pricebook Warehouse
//!
//! Record store for daily stock price records.
//!
//! ## Overview
//!
//! Two engines implement the [`RecordStore`] contract:
//!
//! - [`DuckDbStore`]: embedded `DuckDB` file, used for development and tests
//! - [`MySqlStore`]: networked MySQL server through a `sqlx` pool
//!
//! Both write through a batched bulk upsert. The input sequence is split into
//! batches of at most `max_bulk_operations` rows; each batch is one multi-row
//! `INSERT` with an on-conflict update, run in its own transaction and committed
//! before the next batch starts. A failing batch is rolled back and reported as
//! [`WarehouseError::Storage`]; batches committed before it stay committed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pricebook_warehouse::{DuckDbStore, EntityTable, FinancialRow, RecordStore, WarehouseConfig};
//!
//! # async fn demo() -> Result<(), pricebook_warehouse::WarehouseError> {
//! let store = DuckDbStore::open(WarehouseConfig::default())?;
//! let rows = vec![FinancialRow {
//!     symbol: "IBM".to_string(),
//!     date: "2024-03-01".to_string(),
//!     open_price: 185.5,
//!     close_price: 187.0,
//!     volume: 3_200_000,
//!     updated_at: "2024-03-02 00:00:00".to_string(),
//! }];
//! let report = store.bulk_upsert(EntityTable::financial_data(), rows).await?;
//! assert_eq!(report.batches_committed, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `financial_data` | One row per `(symbol, date)` with open/close prices and volume |
//! | `schema_migrations` | Applied bootstrap versions (embedded engine only) |

pub mod duckdb;
pub mod embedded;
pub mod migrations;
pub mod mysql;
pub mod query;
pub mod table;

use std::env;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};
pub use embedded::DuckDbStore;
pub use mysql::{MySqlConfig, MySqlStore};
pub use query::{Access, QueryPolicy, QueryResult, SqlColumn, SqlScript, Statement, StatementKind};
pub use table::{Column, ColumnType, EntityTable};

/// Default number of rows per upsert statement and per statistics page.
pub const DEFAULT_MAX_BULK_OPERATIONS: usize = 50;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// MySQL driver or pool error.
    #[error(transparent)]
    MySql(#[from] sqlx::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Query was rejected due to policy violation.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// A changing statement was sent with read-only access.
    #[error("read-only access refuses {keyword} statements")]
    ReadOnlyViolation { keyword: String },

    /// Query execution timed out.
    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// The engine refuses the operation in its current mode.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A bulk upsert batch failed and was rolled back.
    #[error("storage failure after {batches_committed} committed batch(es): {source}")]
    Storage {
        batches_committed: usize,
        #[source]
        source: Box<WarehouseError>,
    },

    /// Row values violate the table's constraints before reaching the engine.
    #[error("invalid row: {0}")]
    InvalidRow(String),

    /// `DB_ENGINE` names an engine this crate does not provide.
    #[error("unknown database engine '{0}', expected one of duckdb, mysql")]
    UnknownEngine(String),

    /// A blocking engine task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl WarehouseError {
    pub(crate) fn storage(batches_committed: usize, source: WarehouseError) -> Self {
        Self::Storage {
            batches_committed,
            source: Box::new(source),
        }
    }
}

/// Relational engine backing a [`RecordStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    DuckDb,
    MySql,
}

impl Engine {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuckDb => "duckdb",
            Self::MySql => "mysql",
        }
    }
}

impl Display for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = WarehouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "duckdb" => Ok(Self::DuckDb),
            "mysql" => Ok(Self::MySql),
            other => Err(WarehouseError::UnknownEngine(other.to_string())),
        }
    }
}

/// Configuration for the embedded `DuckDB` engine.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for pricebook data.
    pub pricebook_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
    /// Upper bound on rows per upsert statement.
    pub max_bulk_operations: usize,
    /// Bulk upsert is only permitted on the embedded engine in development mode.
    pub development_mode: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let pricebook_home = resolve_pricebook_home();
        let db_path = pricebook_home.join("pricebook.duckdb");
        Self {
            pricebook_home,
            db_path,
            max_pool_size: 4,
            max_bulk_operations: DEFAULT_MAX_BULK_OPERATIONS,
            development_mode: true,
        }
    }
}

/// A financial record as written by inserts and upserts.
///
/// `date` is `YYYY-MM-DD`; `updated_at` is `YYYY-MM-DD HH:MM:SS` in UTC.
/// `id` and `created_at` are assigned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FinancialRow {
    pub symbol: String,
    pub date: String,
    pub open_price: f64,
    pub close_price: f64,
    pub volume: u64,
    pub updated_at: String,
}

impl FinancialRow {
    /// Number of bound values per row, in `EntityTable::financial_data()` column order.
    pub const ARITY: usize = 6;

    pub fn key(&self) -> (&str, &str) {
        (self.symbol.as_str(), self.date.as_str())
    }

    pub(crate) fn validate(&self) -> Result<(), WarehouseError> {
        if self.symbol.trim().is_empty() || self.date.trim().is_empty() {
            return Err(WarehouseError::InvalidRow(String::from(
                "symbol and date are required",
            )));
        }
        for (field, value) in [
            ("open_price", self.open_price),
            ("close_price", self.close_price),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(WarehouseError::InvalidRow(format!(
                    "{field} must be a non-negative finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// A financial record read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    pub id: u64,
    pub symbol: String,
    pub date: String,
    pub open_price: f64,
    pub close_price: f64,
    pub volume: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Optional equality/range predicates applied by `count` and `fetch_page`.
///
/// Dates are inclusive `YYYY-MM-DD` bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub symbol: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl RecordFilter {
    pub fn is_unfiltered(&self) -> bool {
        self.symbol.is_none() && self.start_date.is_none() && self.end_date.is_none()
    }
}

/// Outcome of a successful bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkUpsertReport {
    /// Input rows covered by committed batches.
    pub rows_written: usize,
    /// Number of transactions committed.
    pub batches_committed: usize,
}

/// Boxed future returned by [`RecordStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, WarehouseError>> + Send + 'a>>;

/// Storage contract shared by the embedded and networked engines.
pub trait RecordStore: Send + Sync {
    fn engine(&self) -> Engine;

    /// Insert or update `rows` in batches, one transaction per batch.
    fn bulk_upsert<'a>(
        &'a self,
        table: &'a EntityTable,
        rows: Vec<FinancialRow>,
    ) -> StoreFuture<'a, BulkUpsertReport>;

    /// Insert a single row and return its primary key. Fails on a duplicate key.
    fn insert<'a>(&'a self, table: &'a EntityTable, row: FinancialRow) -> StoreFuture<'a, u64>;

    fn count<'a>(&'a self, table: &'a EntityTable, filter: &'a RecordFilter)
        -> StoreFuture<'a, u64>;

    /// Fetch one 1-based page of matching rows in primary-key order.
    fn fetch_page<'a>(
        &'a self,
        table: &'a EntityTable,
        filter: &'a RecordFilter,
        page: u64,
        per_page: u64,
    ) -> StoreFuture<'a, Vec<StoredRow>>;

    /// Run a raw script under `policy`. Read-write scripts run in one
    /// transaction and are rolled back as a whole on any failure.
    fn execute_query<'a>(
        &'a self,
        sql: &'a str,
        policy: QueryPolicy,
    ) -> StoreFuture<'a, QueryResult> {
        let _ = (sql, policy);
        let engine = self.engine();
        Box::pin(async move {
            Err(WarehouseError::UnsupportedOperation(format!(
                "raw queries are not available on the {engine} engine"
            )))
        })
    }
}

/// Engine selection plus per-engine settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub engine: Engine,
    pub duckdb: WarehouseConfig,
    pub mysql: MySqlConfig,
}

/// Open the store named by `config.engine`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, WarehouseError> {
    tracing::info!(engine = %config.engine, "opening record store");
    match config.engine {
        Engine::DuckDb => {
            let duckdb = config.duckdb.clone();
            let store = tokio::task::spawn_blocking(move || DuckDbStore::open(duckdb)).await??;
            Ok(Arc::new(store))
        }
        Engine::MySql => Ok(Arc::new(MySqlStore::connect(&config.mysql).await?)),
    }
}

/// Split `rows` into batches of at most `bound` rows.
pub fn batches(rows: &[FinancialRow], bound: usize) -> std::slice::Chunks<'_, FinancialRow> {
    rows.chunks(bound.max(1))
}

/// Keep only the last occurrence of each `(symbol, date)` key, preserving
/// the relative order of the survivors.
pub fn collapse_duplicate_keys(batch: &[FinancialRow]) -> Vec<&FinancialRow> {
    let mut seen = std::collections::HashSet::with_capacity(batch.len());
    let mut survivors: Vec<&FinancialRow> = batch
        .iter()
        .rev()
        .filter(|row| seen.insert(row.key()))
        .collect();
    survivors.reverse();
    survivors
}

/// Resolve the pricebook home directory from environment or default.
fn resolve_pricebook_home() -> PathBuf {
    if let Some(path) = env::var_os("PRICEBOOK_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".pricebook");
    }

    PathBuf::from(".pricebook")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    fn row(symbol: &str, date: &str, open_price: f64) -> FinancialRow {
        FinancialRow {
            symbol: symbol.to_string(),
            date: date.to_string(),
            open_price,
            close_price: open_price + 1.0,
            volume: 100,
            updated_at: "2024-01-10 00:00:00".to_string(),
        }
    }

    #[test]
    fn batches_respect_bound_and_flush_trailing_rows() {
        let rows: Vec<_> = (1..=7)
            .map(|day| row("AAPL", &format!("2024-01-{day:02}"), 1.0))
            .collect();

        let sizes: Vec<usize> = batches(&rows, 3).map(<[FinancialRow]>::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn zero_bound_is_treated_as_one() {
        let rows = vec![row("AAPL", "2024-01-01", 1.0), row("IBM", "2024-01-01", 2.0)];
        assert_eq!(batches(&rows, 0).count(), 2);
    }

    #[test]
    fn duplicate_keys_collapse_to_last_occurrence() {
        let batch = vec![
            row("AAPL", "2024-01-01", 1.0),
            row("IBM", "2024-01-01", 2.0),
            row("AAPL", "2024-01-01", 3.0),
        ];

        let survivors = collapse_duplicate_keys(&batch);
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].symbol, "IBM");
        assert_eq!(survivors[1].open_price, 3.0);
    }

    fn arb_rows(max_len: usize) -> impl Strategy<Value = Vec<FinancialRow>> {
        prop::collection::vec(
            (prop::sample::select(vec!["AAPL", "IBM"]), 1_u8..=28, 0.0..500.0_f64),
            0..max_len,
        )
        .prop_map(|specs| {
            specs
                .into_iter()
                .map(|(symbol, day, open)| row(symbol, &format!("2024-02-{day:02}"), open))
                .collect()
        })
    }

    proptest! {
        /// ceil(n / bound) batches, all full except a non-empty trailing one.
        #[test]
        fn batches_cover_every_row_in_bounded_chunks(rows in arb_rows(120), bound in 1_usize..60) {
            let sizes: Vec<usize> = batches(&rows, bound).map(<[FinancialRow]>::len).collect();

            prop_assert_eq!(sizes.len(), rows.len().div_ceil(bound));
            prop_assert_eq!(sizes.iter().sum::<usize>(), rows.len());
            if let Some((last, full)) = sizes.split_last() {
                prop_assert!(full.iter().all(|&size| size == bound));
                prop_assert!(*last >= 1 && *last <= bound);
            }
        }

        /// One survivor per key, each the last occurrence, in input order.
        #[test]
        fn collapsing_keeps_the_last_row_for_each_key(rows in arb_rows(60)) {
            let mut last_index = HashMap::new();
            for (index, row) in rows.iter().enumerate() {
                last_index.insert(row.key(), index);
            }

            let survivors = collapse_duplicate_keys(&rows);
            prop_assert_eq!(survivors.len(), last_index.len());

            let positions: Vec<usize> = survivors.iter().map(|row| last_index[&row.key()]).collect();
            for (survivor, position) in survivors.iter().zip(&positions) {
                prop_assert!(std::ptr::eq(*survivor, &rows[*position]));
            }
            prop_assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn engine_names_parse_case_insensitively() {
        assert_eq!("DuckDB".parse::<Engine>().expect("duckdb"), Engine::DuckDb);
        assert_eq!(" mysql ".parse::<Engine>().expect("mysql"), Engine::MySql);
        let error = "postgres".parse::<Engine>().expect_err("must fail");
        assert!(matches!(error, WarehouseError::UnknownEngine(name) if name == "postgres"));
    }

    #[test]
    fn row_validation_rejects_negative_prices() {
        let error = row("AAPL", "2024-01-01", -1.0)
            .validate()
            .expect_err("negative price");
        assert!(matches!(error, WarehouseError::InvalidRow(_)));
    }
}

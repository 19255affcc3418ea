//! Behavior-driven tests for the record store
//!
//! These tests exercise the store through the `RecordStore` contract the
//! services use, against a real embedded database file.

use std::sync::Arc;

use pricebook_core::{FinancialRecord, Symbol, UtcDateTime};
use pricebook_tests::warehouse_config;
use pricebook_warehouse::{
    open_store, Engine, EntityTable, FinancialRow, MySqlConfig, RecordFilter, RecordStore,
    StoreConfig, WarehouseConfig, WarehouseError,
};
use tempfile::{tempdir, TempDir};
use time::macros::date;
use time::Date;

async fn embedded_store(development_mode: bool, bound: usize) -> (TempDir, Arc<dyn RecordStore>) {
    let temp = tempdir().expect("tempdir");
    let config = StoreConfig {
        engine: Engine::DuckDb,
        duckdb: WarehouseConfig {
            db_path: temp.path().join("data").join("pricebook.duckdb"),
            ..warehouse_config(&temp, development_mode, bound)
        },
        mysql: MySqlConfig::default(),
    };
    let store = open_store(&config).await.expect("store should open");
    (temp, store)
}

fn row(symbol: Symbol, date: Date, open_price: f64) -> FinancialRow {
    FinancialRecord::new(symbol, date, open_price, open_price + 1.0, 10_000, UtcDateTime::now())
        .expect("valid record")
        .to_row()
}

fn days(symbol: Symbol, count: u8) -> Vec<FinancialRow> {
    (1..=count)
        .map(|day| {
            let date = Date::from_calendar_date(2024, time::Month::January, day).expect("date");
            row(symbol, date, f64::from(day))
        })
        .collect()
}

// =============================================================================
// Upsert key resolution
// =============================================================================

#[tokio::test]
async fn when_the_same_day_is_written_twice_one_record_holds_the_second_write() {
    // Given: An empty store
    let (_temp, store) = embedded_store(true, 50).await;
    let table = EntityTable::financial_data();

    // When: IBM on 2024-01-02 is written, then written again with new prices
    store
        .bulk_upsert(table, vec![row(Symbol::Ibm, date!(2024 - 01 - 02), 10.0)])
        .await
        .expect("first write");
    store
        .bulk_upsert(table, vec![row(Symbol::Ibm, date!(2024 - 01 - 02), 20.0)])
        .await
        .expect("second write");

    // Then: Exactly one record exists and it carries the second write's values
    let filter = RecordFilter::default();
    assert_eq!(store.count(table, &filter).await.expect("count"), 1);
    let stored = store.fetch_page(table, &filter, 1, 10).await.expect("page");
    assert_eq!(stored[0].open_price, 20.0);
    assert_eq!(stored[0].close_price, 21.0);
}

#[tokio::test]
async fn when_rows_exceed_the_bound_each_batch_is_committed_separately() {
    // Given: A store bounded at 4 rows per batch
    let (_temp, store) = embedded_store(true, 4).await;
    let table = EntityTable::financial_data();

    // When: 10 AAPL rows are upserted
    let report = store
        .bulk_upsert(table, days(Symbol::Aapl, 10))
        .await
        .expect("upsert");

    // Then: ceil(10 / 4) commits happen and every row is stored
    assert_eq!(report.batches_committed, 3);
    assert_eq!(report.rows_written, 10);
    assert_eq!(
        store.count(table, &RecordFilter::default()).await.expect("count"),
        10
    );
}

#[tokio::test]
async fn when_nothing_is_upserted_nothing_is_committed() {
    let (_temp, store) = embedded_store(true, 4).await;

    let report = store
        .bulk_upsert(EntityTable::financial_data(), Vec::new())
        .await
        .expect("empty upsert");

    assert_eq!(report.batches_committed, 0);
    assert_eq!(report.rows_written, 0);
}

// =============================================================================
// Failure semantics
// =============================================================================

#[tokio::test]
async fn when_a_later_batch_fails_earlier_batches_stay_committed() {
    // Given: A store bounded at 2 rows per batch
    let (_temp, store) = embedded_store(true, 2).await;
    let table = EntityTable::financial_data();

    // When: The third row violates the symbol constraint
    let mut rows = days(Symbol::Ibm, 2);
    rows.push(FinancialRow {
        symbol: "MSFT".to_string(),
        ..row(Symbol::Ibm, date!(2024 - 01 - 03), 3.0)
    });
    rows.push(row(Symbol::Ibm, date!(2024 - 01 - 04), 4.0));
    let error = store.bulk_upsert(table, rows).await.expect_err("must fail");

    // Then: The error reports one committed batch, and only that batch is stored
    assert!(matches!(
        error,
        WarehouseError::Storage {
            batches_committed: 1,
            ..
        }
    ));
    assert_eq!(
        store.count(table, &RecordFilter::default()).await.expect("count"),
        2
    );
}

#[tokio::test]
async fn when_not_in_development_mode_the_embedded_engine_refuses_bulk_upsert() {
    // Given: An embedded store opened for production
    let (_temp, store) = embedded_store(false, 50).await;
    let table = EntityTable::financial_data();

    // When: A bulk upsert is attempted
    let error = store
        .bulk_upsert(table, days(Symbol::Aapl, 3))
        .await
        .expect_err("must be refused");

    // Then: It is refused as unsupported and nothing is written
    assert!(matches!(error, WarehouseError::UnsupportedOperation(_)));
    assert_eq!(
        store.count(table, &RecordFilter::default()).await.expect("count"),
        0
    );
}

#[tokio::test]
async fn when_a_single_insert_repeats_a_key_it_fails() {
    let (_temp, store) = embedded_store(false, 50).await;
    let table = EntityTable::financial_data();

    let first = store
        .insert(table, row(Symbol::Aapl, date!(2024 - 01 - 02), 1.0))
        .await
        .expect("insert");
    assert!(first > 0);

    let error = store
        .insert(table, row(Symbol::Aapl, date!(2024 - 01 - 02), 2.0))
        .await
        .expect_err("duplicate key");
    assert!(matches!(error, WarehouseError::DuckDb(_)));
}

// =============================================================================
// Filtered reads
// =============================================================================

#[tokio::test]
async fn when_filtering_by_symbol_and_dates_bounds_are_inclusive() {
    // Given: Ten days for each symbol
    let (_temp, store) = embedded_store(true, 50).await;
    let table = EntityTable::financial_data();
    let mut rows = days(Symbol::Aapl, 10);
    rows.extend(days(Symbol::Ibm, 10));
    store.bulk_upsert(table, rows).await.expect("upsert");

    // When: IBM is filtered from the 3rd to the 7th
    let filter = RecordFilter {
        symbol: Some("IBM".to_string()),
        start_date: Some("2024-01-03".to_string()),
        end_date: Some("2024-01-07".to_string()),
    };

    // Then: Both end dates are included, in insertion order
    assert_eq!(store.count(table, &filter).await.expect("count"), 5);
    let page = store.fetch_page(table, &filter, 1, 3).await.expect("page");
    let dates: Vec<_> = page.iter().map(|r| r.date.as_str()).collect();
    assert_eq!(dates, vec!["2024-01-03", "2024-01-04", "2024-01-05"]);

    let records: Vec<FinancialRecord> = page
        .into_iter()
        .map(|stored| FinancialRecord::try_from(stored).expect("stored rows are valid"))
        .collect();
    assert!(records.iter().all(|r| r.symbol == Symbol::Ibm && r.created_at.is_some()));
}

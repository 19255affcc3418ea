//! Behavior-driven tests for listing and statistics
//!
//! These tests verify what an API consumer observes when paging through
//! stored prices and asking for averages, backed by an embedded database.

use std::sync::Arc;

use pricebook_core::statistics::{
    AVERAGE_DAILY_CLOSE_PRICE, AVERAGE_DAILY_OPEN_PRICE, AVERAGE_DAILY_VOLUME,
};
use pricebook_core::{
    FinancialRecord, ListRequest, QueryError, QueryService, StatisticsRequest, Symbol,
    UtcDateTime, ValidationError,
};
use pricebook_warehouse::{EntityTable, RecordStore};
use tempfile::{tempdir, TempDir};
use time::macros::date;
use time::{Date, Month};

fn embedded_store() -> (TempDir, Arc<dyn RecordStore>) {
    let temp = tempdir().expect("tempdir");
    let store = pricebook_tests::embedded_store(&temp, 50);
    (temp, store)
}

/// Store `count` consecutive January days for `symbol`, open price = day number.
async fn seed(store: &Arc<dyn RecordStore>, symbol: Symbol, count: u8) {
    let rows = (1..=count)
        .map(|day| {
            let date = Date::from_calendar_date(2024, Month::January, day).expect("date");
            let open = f64::from(day);
            FinancialRecord::new(symbol, date, open, open * 2.0, u64::from(day) * 100, UtcDateTime::now())
                .expect("valid record")
                .to_row()
        })
        .collect();
    store
        .bulk_upsert(EntityTable::financial_data(), rows)
        .await
        .expect("seed");
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn when_user_lists_an_empty_book_they_get_nothing_without_a_page_error() {
    // Given: No records have been ingested
    let (_temp, store) = embedded_store();
    let service = QueryService::new(store);

    // When: They ask for page 3
    let page = service
        .list(&ListRequest {
            page: 3,
            ..ListRequest::default()
        })
        .await
        .expect("empty listing is not an error");

    // Then: The total is zero and no records are returned
    assert_eq!(page.total, 0);
    assert!(page.records.is_empty());
}

#[tokio::test]
async fn when_user_pages_past_the_end_they_learn_the_last_page() {
    // Given: 12 IBM records
    let (_temp, store) = embedded_store();
    seed(&store, Symbol::Ibm, 12).await;
    let service = QueryService::new(store);

    // When: They ask for page 4 with the default limit of 5
    let error = service
        .list(&ListRequest {
            page: 4,
            ..ListRequest::default()
        })
        .await
        .expect_err("page 4 does not exist");

    // Then: The error names the requested page and ceil(12 / 5) = 3
    assert!(matches!(
        error,
        QueryError::PageOutOfBounds { requested: 4, max: 3 }
    ));
    assert!(error.to_string().contains("max page is 3"));
}

#[tokio::test]
async fn when_user_filters_by_symbol_and_dates_they_see_only_matches_in_order() {
    // Given: Ten days for both symbols
    let (_temp, store) = embedded_store();
    seed(&store, Symbol::Aapl, 10).await;
    seed(&store, Symbol::Ibm, 10).await;
    let service = QueryService::new(store);

    // When: They list APPLE from the 2nd to the 8th, three per page, page 2
    let page = service
        .list(&ListRequest {
            limit: 3,
            page: 2,
            start_date: Some(date!(2024 - 01 - 02)),
            end_date: Some(date!(2024 - 01 - 08)),
            symbol: Some(Symbol::parse("apple").expect("display name")),
        })
        .await
        .expect("listing");

    // Then: Seven records match and the second page holds days 5 to 7
    assert_eq!(page.total, 7);
    let dates: Vec<_> = page.records.iter().map(|r| r.date).collect();
    assert_eq!(
        dates,
        vec![date!(2024 - 01 - 05), date!(2024 - 01 - 06), date!(2024 - 01 - 07)]
    );
    assert!(page.records.iter().all(|r| r.symbol == Symbol::Aapl));
}

#[tokio::test]
async fn when_user_reverses_the_date_range_the_request_is_invalid() {
    let (_temp, store) = embedded_store();
    seed(&store, Symbol::Ibm, 3).await;
    let service = QueryService::new(store);

    let error = service
        .list(&ListRequest {
            start_date: Some(date!(2024 - 01 - 09)),
            end_date: Some(date!(2024 - 01 - 01)),
            ..ListRequest::default()
        })
        .await
        .expect_err("reversed range");

    assert!(matches!(
        error,
        QueryError::Validation(ValidationError::InvalidDateRange { .. })
    ));
}

// =============================================================================
// Statistics
// =============================================================================

#[tokio::test]
async fn when_user_asks_for_averages_across_many_pages_they_match_a_single_pass_mean() {
    // Given: 23 IBM records and statistics paged 5 rows at a time
    let (_temp, store) = embedded_store();
    seed(&store, Symbol::Ibm, 23).await;
    seed(&store, Symbol::Aapl, 23).await;
    let service = QueryService::new(store).with_page_size(5);

    // When: They ask for IBM over the whole month
    let stats = service
        .statistics(&StatisticsRequest {
            start_date: date!(2024 - 01 - 01),
            end_date: date!(2024 - 01 - 31),
            symbol: Symbol::Ibm,
        })
        .await
        .expect("statistics");

    // Then: Means equal the arithmetic mean of days 1..=23
    assert_eq!(stats.get(AVERAGE_DAILY_OPEN_PRICE), Some(12.0));
    assert_eq!(stats.get(AVERAGE_DAILY_CLOSE_PRICE), Some(24.0));
    assert_eq!(stats.get(AVERAGE_DAILY_VOLUME), Some(1_200.0));
}

#[tokio::test]
async fn when_user_asks_for_open_prices_one_two_three_the_average_is_exactly_two() {
    let (_temp, store) = embedded_store();
    seed(&store, Symbol::Aapl, 3).await;
    let service = QueryService::new(store);

    let stats = service
        .statistics(&StatisticsRequest {
            start_date: date!(2024 - 01 - 01),
            end_date: date!(2024 - 01 - 03),
            symbol: Symbol::Aapl,
        })
        .await
        .expect("statistics");

    assert_eq!(stats.get(AVERAGE_DAILY_OPEN_PRICE), Some(2.0));
}

#[tokio::test]
async fn when_nothing_matches_statistics_are_empty() {
    let (_temp, store) = embedded_store();
    seed(&store, Symbol::Aapl, 3).await;
    let service = QueryService::new(store);

    let stats = service
        .statistics(&StatisticsRequest {
            start_date: date!(2024 - 02 - 01),
            end_date: date!(2024 - 02 - 28),
            symbol: Symbol::Aapl,
        })
        .await
        .expect("statistics");

    assert!(stats.is_empty());
}

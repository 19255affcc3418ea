//! Read side: paginated listing and mean statistics.

use std::sync::Arc;
use std::time::Duration;

use pricebook_warehouse::{EntityTable, RecordFilter, RecordStore, DEFAULT_MAX_BULK_OPERATIONS};
use time::Date;

use crate::cache::{TtlCache, DEFAULT_STATISTICS_TTL};
use crate::statistics::{MeanAccumulator, Statistics};
use crate::{format_date, logging, FinancialRecord, QueryError, Symbol, ValidationError};

pub const DEFAULT_LIST_LIMIT: u64 = 5;
pub const MAX_LIST_LIMIT: u64 = 10_000;

/// Filters and paging for [`QueryService::list`]. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub limit: u64,
    pub page: u64,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub symbol: Option<Symbol>,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            page: 1,
            start_date: None,
            end_date: None,
            symbol: None,
        }
    }
}

impl ListRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit == 0 || self.limit > MAX_LIST_LIMIT {
            return Err(ValidationError::InvalidLimit {
                value: self.limit,
                max: MAX_LIST_LIMIT,
            });
        }
        if self.page == 0 {
            return Err(ValidationError::InvalidPage { value: self.page });
        }
        validate_range(self.start_date, self.end_date)
    }

    fn filter(&self) -> RecordFilter {
        RecordFilter {
            symbol: self.symbol.map(|symbol| symbol.code().to_owned()),
            start_date: self.start_date.map(format_date),
            end_date: self.end_date.map(format_date),
        }
    }
}

/// Inclusive date range and symbol for [`QueryService::statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatisticsRequest {
    pub start_date: Date,
    pub end_date: Date,
    pub symbol: Symbol,
}

impl StatisticsRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_range(Some(self.start_date), Some(self.end_date))
    }

    fn filter(&self) -> RecordFilter {
        RecordFilter {
            symbol: Some(self.symbol.code().to_owned()),
            start_date: Some(format_date(self.start_date)),
            end_date: Some(format_date(self.end_date)),
        }
    }
}

/// One page of listed records plus the total match count.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub total: u64,
    pub records: Vec<FinancialRecord>,
}

impl RecordPage {
    fn empty() -> Self {
        Self {
            total: 0,
            records: Vec::new(),
        }
    }
}

/// Query service over a [`RecordStore`].
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn RecordStore>,
    table: &'static EntityTable,
    page_size: u64,
    cache: TtlCache<StatisticsRequest, Statistics>,
}

impl QueryService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            table: EntityTable::financial_data(),
            page_size: DEFAULT_MAX_BULK_OPERATIONS as u64,
            cache: TtlCache::new(DEFAULT_STATISTICS_TTL),
        }
    }

    /// Rows fetched per round trip while computing statistics.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1) as u64;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = TtlCache::new(ttl);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// List matching records, `request.limit` per page, in primary-key order.
    ///
    /// An empty table or an empty match set yields a zero total without
    /// checking the page. A page past the last one is an error.
    pub async fn list(&self, request: &ListRequest) -> Result<RecordPage, QueryError> {
        logging::instrumented("list_financial_data", self.list_inner(request)).await
    }

    async fn list_inner(&self, request: &ListRequest) -> Result<RecordPage, QueryError> {
        request.validate()?;

        let everything = RecordFilter::default();
        if self.store.count(self.table, &everything).await? == 0 {
            return Ok(RecordPage::empty());
        }

        let filter = request.filter();
        let total = self.store.count(self.table, &filter).await?;
        if total == 0 {
            return Ok(RecordPage::empty());
        }

        let max_page = total.div_ceil(request.limit);
        if request.page > max_page {
            return Err(QueryError::PageOutOfBounds {
                requested: request.page,
                max: max_page,
            });
        }

        let rows = self
            .store
            .fetch_page(self.table, &filter, request.page, request.limit)
            .await?;
        let records = rows
            .into_iter()
            .map(FinancialRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecordPage { total, records })
    }

    /// Mean open price, close price and volume for one symbol over an
    /// inclusive date range.
    ///
    /// Rows are streamed page by page; no match yields empty statistics.
    /// Non-empty results are memoized per request for the cache TTL.
    pub async fn statistics(&self, request: &StatisticsRequest) -> Result<Statistics, QueryError> {
        logging::instrumented("get_statistics", self.statistics_inner(request)).await
    }

    async fn statistics_inner(&self, request: &StatisticsRequest) -> Result<Statistics, QueryError> {
        request.validate()?;

        if let Some(cached) = self.cache.get(request).await {
            tracing::debug!(symbol = %request.symbol, "statistics served from cache");
            return Ok(cached);
        }

        let filter = request.filter();
        if self.store.count(self.table, &filter).await? == 0 {
            return Ok(Statistics::default());
        }

        let mut accumulator = MeanAccumulator::new();
        let mut page = 1;
        loop {
            let rows = self
                .store
                .fetch_page(self.table, &filter, page, self.page_size)
                .await?;
            let fetched = rows.len() as u64;
            for row in rows {
                accumulator.push(&FinancialRecord::try_from(row)?);
            }
            if fetched < self.page_size {
                break;
            }
            page += 1;
        }

        tracing::debug!(
            symbol = %request.symbol,
            rows = accumulator.count(request.symbol),
            pages = page,
            "statistics computed"
        );
        let statistics = accumulator.finish(request.symbol);
        if !statistics.is_empty() {
            self.cache.put(*request, statistics.clone()).await;
        }
        Ok(statistics)
    }
}

fn validate_range(start: Option<Date>, end: Option<Date>) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(ValidationError::InvalidDateRange {
            start: format_date(start),
            end: format_date(end),
        }),
        _ => Ok(()),
    }
}

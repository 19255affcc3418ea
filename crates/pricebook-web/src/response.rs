//! Response bodies. Prices and averages are rounded to one decimal here and
//! nowhere else.

use pricebook_core::{format_date, FinancialRecord};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Info {
    pub error: String,
}

/// `{ data, [pagination], info }` wrapper shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub info: Info,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            pagination: None,
            info: Info::default(),
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::ok(data)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            pagination: None,
            info: Info {
                error: message.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub count: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(count: u64, page: u64, limit: u64) -> Self {
        Self {
            count,
            page,
            limit,
            pages: count.div_ceil(limit.max(1)),
        }
    }
}

/// Public view of a record: no id, no timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialDataView {
    pub symbol: &'static str,
    pub date: String,
    pub open_price: f64,
    pub close_price: f64,
    pub volume: u64,
}

impl From<&FinancialRecord> for FinancialDataView {
    fn from(record: &FinancialRecord) -> Self {
        Self {
            symbol: record.symbol.code(),
            date: format_date(record.date),
            open_price: round_one_decimal(record.open_price),
            close_price: round_one_decimal(record.close_price),
            volume: record.volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsView {
    pub start_date: String,
    pub end_date: String,
    pub symbol: &'static str,
    pub average_daily_open_price: f64,
    pub average_daily_close_price: f64,
    pub average_daily_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use pricebook_core::query::DEFAULT_LIST_LIMIT;
use pricebook_core::statistics::{
    AVERAGE_DAILY_CLOSE_PRICE, AVERAGE_DAILY_OPEN_PRICE, AVERAGE_DAILY_VOLUME,
};
use pricebook_core::{
    format_date, parse_date, ListRequest, QueryService, StatisticsRequest, Symbol,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::response::{
    round_one_decimal, Envelope, FinancialDataView, Health, Pagination, StatisticsView,
};

/// Raw query string; parsed by hand so every failure uses the error envelope.
#[derive(Debug, Default, Deserialize)]
pub struct FinancialDataParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub symbol: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
}

impl FinancialDataParams {
    fn to_request(&self) -> Result<ListRequest, ApiError> {
        Ok(ListRequest {
            limit: parse_count("limit", self.limit.as_deref())?.unwrap_or(DEFAULT_LIST_LIMIT),
            page: parse_count("page", self.page.as_deref())?.unwrap_or(1),
            start_date: non_blank(&self.start_date).map(parse_date).transpose()?,
            end_date: non_blank(&self.end_date).map(parse_date).transpose()?,
            symbol: non_blank(&self.symbol).map(Symbol::parse).transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub symbol: Option<String>,
}

impl StatisticsParams {
    fn to_request(&self) -> Result<StatisticsRequest, ApiError> {
        let required = |name, value| {
            non_blank(value).ok_or_else(|| ApiError::missing_parameter(name))
        };
        Ok(StatisticsRequest {
            start_date: parse_date(required("start_date", &self.start_date)?)?,
            end_date: parse_date(required("end_date", &self.end_date)?)?,
            symbol: Symbol::parse(required("symbol", &self.symbol)?)?,
        })
    }
}

pub async fn list_financial_data(
    State(service): State<Arc<QueryService>>,
    Query(params): Query<FinancialDataParams>,
) -> Result<Json<Envelope<Vec<FinancialDataView>>>, ApiError> {
    let request = params.to_request()?;
    let page = service.list(&request).await?;
    if page.records.is_empty() {
        return Err(ApiError::NotFound(String::from(
            "no financial data matches the given filters",
        )));
    }

    let data = page.records.iter().map(FinancialDataView::from).collect();
    Ok(Json(Envelope::paginated(
        data,
        Pagination::new(page.total, request.page, request.limit),
    )))
}

pub async fn get_statistics(
    State(service): State<Arc<QueryService>>,
    Query(params): Query<StatisticsParams>,
) -> Result<Json<Envelope<StatisticsView>>, ApiError> {
    let request = params.to_request()?;
    let statistics = service.statistics(&request).await?;

    let average = |name: &str| statistics.get(name).map(round_one_decimal);
    let (Some(open), Some(close), Some(volume)) = (
        average(AVERAGE_DAILY_OPEN_PRICE),
        average(AVERAGE_DAILY_CLOSE_PRICE),
        average(AVERAGE_DAILY_VOLUME),
    ) else {
        return Err(ApiError::NotFound(format!(
            "no statistics for {} between {} and {}",
            request.symbol,
            format_date(request.start_date),
            format_date(request.end_date)
        )));
    };

    Ok(Json(Envelope::ok(StatisticsView {
        start_date: format_date(request.start_date),
        end_date: format_date(request.end_date),
        symbol: request.symbol.code(),
        average_daily_open_price: open,
        average_daily_close_price: close,
        average_daily_volume: volume,
    })))
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_count(name: &str, raw: Option<&str>) -> Result<Option<u64>, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("{name} must be a positive integer, got '{value}'"))),
        None => Ok(None),
    }
}

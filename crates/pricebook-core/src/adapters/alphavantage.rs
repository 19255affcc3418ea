use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use time::{Date, Duration};

use crate::error::SourceError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::throttling::RateBudget;
use crate::{format_date, FinancialRecord, Symbol, UtcDateTime};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const DAILY_SERIES_FUNCTION: &str = "TIME_SERIES_DAILY_ADJUSTED";
pub const DAILY_SERIES_KEY: &str = "Time Series (Daily)";
/// Calendar days walked back from today on every run.
pub const DEFAULT_LOOKBACK_DAYS: u16 = 14;

/// Alpha Vantage API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for a blank key.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Daily bar as Alpha Vantage encodes it: every number is a string.
#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "6. volume")]
    volume: String,
}

/// Client for the Alpha Vantage daily time series.
#[derive(Clone)]
pub struct AlphaVantageClient {
    http_client: Arc<dyn HttpClient>,
    api_key: ApiKey,
    base_url: String,
    timeout_ms: u64,
    lookback_days: u16,
    budget: RateBudget,
}

impl AlphaVantageClient {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: ApiKey) -> Self {
        Self {
            http_client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_ms: 10_000,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            budget: RateBudget::alphavantage_free_tier(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_budget(mut self, budget: RateBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_lookback_days(mut self, lookback_days: u16) -> Self {
        self.lookback_days = lookback_days;
        self
    }

    pub const fn lookback_days(&self) -> u16 {
        self.lookback_days
    }

    pub fn daily_series_url(&self, symbol: Symbol) -> String {
        format!(
            "{}?function={}&symbol={}&outputsize=compact&datatype=json&apikey={}",
            self.base_url,
            DAILY_SERIES_FUNCTION,
            urlencoding::encode(symbol.code()),
            urlencoding::encode(self.api_key.expose()),
        )
    }

    /// Fetch the daily series for `symbol` and keep the days inside the
    /// lookback window ending at `today`, newest first.
    ///
    /// Dates absent from the payload (weekends, holidays) are skipped.
    pub async fn fetch_recent_days(
        &self,
        symbol: Symbol,
        today: Date,
        updated_at: UtcDateTime,
    ) -> Result<Vec<FinancialRecord>, SourceError> {
        if let Err(delay) = self.budget.acquire() {
            return Err(SourceError::rate_limited(format!(
                "alphavantage free-tier limit exceeded; retry in {:.2}s",
                delay.as_secs_f64()
            )));
        }

        let request =
            HttpRequest::get(self.daily_series_url(symbol)).with_timeout_ms(self.timeout_ms);
        let response = self.http_client.execute(request).await.map_err(|e| {
            SourceError::unavailable(format!("alphavantage transport error: {}", e.message()))
        })?;

        if !response.is_success() {
            return Err(SourceError::unavailable(format!(
                "alphavantage returned status {}",
                response.status
            )));
        }

        let series = parse_daily_series(&response.body)?;
        tracing::debug!(
            symbol = %symbol,
            available_days = series.len(),
            "alphavantage daily series received"
        );

        let mut records = Vec::new();
        for offset in 0..i64::from(self.lookback_days) {
            let Some(day) = today.checked_sub(Duration::days(offset)) else {
                break;
            };
            let Some(bar) = series.get(&format_date(day)) else {
                continue;
            };
            records.push(normalize_bar(symbol, day, bar, updated_at)?);
        }
        Ok(records)
    }
}

impl Debug for AlphaVantageClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageClient")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("lookback_days", &self.lookback_days)
            .finish_non_exhaustive()
    }
}

fn parse_daily_series(body: &str) -> Result<BTreeMap<String, DailyBar>, SourceError> {
    let mut payload: Value = serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(format!("failed to parse alphavantage response: {e}")))?;

    if let Some(message) = payload.get("Error Message").and_then(Value::as_str) {
        return Err(SourceError::rejected(format!("alphavantage error: {message}")));
    }
    if let Some(note) = payload.get("Note").and_then(Value::as_str) {
        return Err(SourceError::rate_limited(format!("alphavantage note: {note}")));
    }
    if let Some(information) = payload.get("Information").and_then(Value::as_str) {
        return Err(SourceError::rejected(format!(
            "alphavantage information: {information}"
        )));
    }

    let series = payload
        .get_mut(DAILY_SERIES_KEY)
        .map(Value::take)
        .ok_or_else(|| SourceError::malformed(format!("response has no '{DAILY_SERIES_KEY}' object")))?;

    serde_json::from_value(series)
        .map_err(|e| SourceError::malformed(format!("invalid daily series entry: {e}")))
}

fn normalize_bar(
    symbol: Symbol,
    day: Date,
    bar: &DailyBar,
    updated_at: UtcDateTime,
) -> Result<FinancialRecord, SourceError> {
    let open = parse_number::<f64>("1. open", &bar.open, day)?;
    let close = parse_number::<f64>("4. close", &bar.close, day)?;
    let volume = parse_number::<u64>("6. volume", &bar.volume, day)?;

    FinancialRecord::new(symbol, day, open, close, volume, updated_at)
        .map_err(|e| SourceError::malformed(format!("{symbol} {}: {e}", format_date(day))))
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str, day: Date) -> Result<T, SourceError> {
    raw.trim().parse().map_err(|_| {
        SourceError::malformed(format!(
            "'{field}' on {} is not a number: '{raw}'",
            format_date(day)
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    use time::macros::date;

    use super::*;
    use crate::error::SourceErrorKind;
    use crate::http_client::{HttpError, HttpResponse};

    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn responding(response: Result<HttpResponse, HttpError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn bar(open: &str, close: &str, volume: &str) -> Value {
        serde_json::json!({
            "1. open": open,
            "2. high": "0",
            "3. low": "0",
            "4. close": close,
            "5. adjusted close": close,
            "6. volume": volume,
        })
    }

    fn client(http: Arc<RecordingHttpClient>) -> AlphaVantageClient {
        AlphaVantageClient::new(http, ApiKey::new("alpha-key").expect("key"))
    }

    fn stamp() -> UtcDateTime {
        UtcDateTime::parse("2024-03-15T06:00:00Z").expect("timestamp")
    }

    #[test]
    fn api_key_is_redacted_and_blank_keys_are_refused() {
        let key = ApiKey::new("  secret-value\n").expect("key");
        assert_eq!(key.expose(), "secret-value");
        assert!(!format!("{key:?}").contains("secret"));
        assert!(ApiKey::new("   ").is_none());

        let http = RecordingHttpClient::responding(Ok(HttpResponse::ok_json("{}")));
        let rendered = format!("{:?}", AlphaVantageClient::new(http, key));
        assert!(!rendered.contains("secret-value"));
    }

    #[test]
    fn daily_series_url_carries_function_symbol_and_key() {
        let http = RecordingHttpClient::responding(Ok(HttpResponse::ok_json("{}")));
        let url = client(http).daily_series_url(Symbol::Ibm);
        assert_eq!(
            url,
            "https://www.alphavantage.co/query?function=TIME_SERIES_DAILY_ADJUSTED&symbol=IBM&outputsize=compact&datatype=json&apikey=alpha-key"
        );
    }

    #[tokio::test]
    async fn walks_back_fourteen_days_skipping_absent_dates() {
        let today = date!(2024 - 03 - 15);
        let mut series = serde_json::Map::new();
        // ten trading days inside the window plus one older day outside it
        for day in [15, 14, 13, 12, 11, 8, 7, 6, 5, 4] {
            series.insert(format!("2024-03-{day:02}"), bar("100.5", "101.25", "1000"));
        }
        series.insert("2024-02-29".into(), bar("1", "1", "1"));
        let body = serde_json::json!({ "Meta Data": {}, "Time Series (Daily)": series });

        let http = RecordingHttpClient::responding(Ok(HttpResponse::ok_json(body.to_string())));
        let records = client(Arc::clone(&http))
            .with_timeout_ms(2_500)
            .fetch_recent_days(Symbol::Aapl, today, stamp())
            .await
            .expect("fetch");

        assert_eq!(records.len(), 10);
        assert_eq!(records[0].date, date!(2024 - 03 - 15));
        assert_eq!(records[9].date, date!(2024 - 03 - 04));
        assert!(records.iter().all(|r| r.symbol == Symbol::Aapl));
        assert!(records.iter().all(|r| r.updated_at == stamp()));
        assert_eq!(records[0].open_price, 100.5);
        assert_eq!(records[0].close_price, 101.25);
        assert_eq!(records[0].volume, 1000);

        let requests = http.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].timeout_ms, 2_500);
        assert!(requests[0].url.contains("symbol=AAPL"));
    }

    #[tokio::test]
    async fn error_payloads_map_to_source_errors() {
        let cases = [
            (r#"{"Error Message": "Invalid API call"}"#, SourceErrorKind::Rejected),
            (r#"{"Note": "Thank you for using Alpha Vantage"}"#, SourceErrorKind::RateLimited),
            (r#"{"Information": "premium endpoint"}"#, SourceErrorKind::Rejected),
            (r#"{"Meta Data": {}}"#, SourceErrorKind::Malformed),
            ("not json", SourceErrorKind::Malformed),
        ];

        for (body, expected) in cases {
            let http = RecordingHttpClient::responding(Ok(HttpResponse::ok_json(body)));
            let error = client(http)
                .fetch_recent_days(Symbol::Ibm, date!(2024 - 03 - 15), stamp())
                .await
                .expect_err("error payload");
            assert_eq!(error.kind(), expected, "body: {body}");
        }
    }

    #[tokio::test]
    async fn non_numeric_fields_are_malformed() {
        let body = serde_json::json!({
            "Time Series (Daily)": { "2024-03-15": bar("abc", "1", "1") }
        });
        let http = RecordingHttpClient::responding(Ok(HttpResponse::ok_json(body.to_string())));
        let error = client(http)
            .fetch_recent_days(Symbol::Ibm, date!(2024 - 03 - 15), stamp())
            .await
            .expect_err("malformed");
        assert_eq!(error.kind(), SourceErrorKind::Malformed);
        assert!(error.message().contains("1. open"));
    }

    #[tokio::test]
    async fn transport_failures_and_bad_status_are_unavailable() {
        let http = RecordingHttpClient::responding(Err(HttpError::timeout("timed out")));
        let error = client(http)
            .fetch_recent_days(Symbol::Ibm, date!(2024 - 03 - 15), stamp())
            .await
            .expect_err("transport");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable);

        let http = RecordingHttpClient::responding(Ok(HttpResponse {
            status: 503,
            body: String::new(),
        }));
        let error = client(http)
            .fetch_recent_days(Symbol::Ibm, date!(2024 - 03 - 15), stamp())
            .await
            .expect_err("status");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert!(error.message().contains("503"));
    }

    #[tokio::test]
    async fn exhausted_budget_fails_without_calling_out() {
        let http = RecordingHttpClient::responding(Ok(HttpResponse::ok_json("{}")));
        let client = client(Arc::clone(&http))
            .with_budget(RateBudget::new(StdDuration::from_secs(60), 1));

        let _ = client
            .fetch_recent_days(Symbol::Ibm, date!(2024 - 03 - 15), stamp())
            .await;
        let error = client
            .fetch_recent_days(Symbol::Ibm, date!(2024 - 03 - 15), stamp())
            .await
            .expect_err("budget spent");

        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert_eq!(http.recorded_requests().len(), 1);
    }
}

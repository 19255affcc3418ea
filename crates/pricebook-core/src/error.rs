use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use pricebook_warehouse::WarehouseError;
use thiserror::Error;

/// Validation and contract errors exposed by `pricebook-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol '{value}' is not defined, expected one of AAPL (APPLE), IBM")]
    UnknownSymbol { value: String },

    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("start_date {start} must not be after end_date {end}")]
    InvalidDateRange { start: String, end: String },
    #[error("limit must be between 1 and {max}, got {value}")]
    InvalidLimit { value: u64, max: u64 },
    #[error("page must be at least 1, got {value}")]
    InvalidPage { value: u64 },
}

/// Errors raised by the query service.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("page {requested} is out of bounds, max page is {max}")]
    PageOutOfBounds { requested: u64, max: u64 },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Errors raised by the ingestion job.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("market data API key not found at '{}'", path.display())]
    CredentialNotFound { path: PathBuf },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Settings could not be resolved from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Market-data source error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    Rejected,
    Malformed,
}

/// Structured error from the market-data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
        }
    }

    /// The source answered with an error payload (bad key, unknown symbol, quota note).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Rejected,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Malformed,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Rejected => "source.rejected",
            SourceErrorKind::Malformed => "source.malformed",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

//! # Domain Models
//!
//! Canonical domain types for pricebook.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Closed set of tracked tickers (code + display name) |
//! | [`FinancialRecord`] | Daily open/close prices and volume for one symbol |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Construction validates invariants: symbols outside the set, negative or
//! non-finite prices, and malformed dates are rejected with a
//! [`ValidationError`](crate::ValidationError).

mod record;
mod symbol;
mod timestamp;

pub use record::FinancialRecord;
pub use symbol::Symbol;
pub use timestamp::{format_date, parse_date, UtcDateTime};

use pricebook_warehouse::{FinancialRow, StoredRow};
use serde::Serialize;
use time::Date;

use crate::domain::timestamp::{format_date, parse_date};
use crate::{Symbol, UtcDateTime, ValidationError};

/// One trading day of prices and volume for one symbol.
///
/// `id` and `created_at` are assigned by storage and absent on freshly
/// ingested records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialRecord {
    pub id: Option<u64>,
    pub symbol: Symbol,
    #[serde(serialize_with = "serialize_date")]
    pub date: Date,
    pub open_price: f64,
    pub close_price: f64,
    pub volume: u64,
    pub created_at: Option<UtcDateTime>,
    pub updated_at: UtcDateTime,
}

impl FinancialRecord {
    pub fn new(
        symbol: Symbol,
        date: Date,
        open_price: f64,
        close_price: f64,
        volume: u64,
        updated_at: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_price("open_price", open_price)?;
        validate_price("close_price", close_price)?;
        Ok(Self {
            id: None,
            symbol,
            date,
            open_price,
            close_price,
            volume,
            created_at: None,
            updated_at,
        })
    }

    pub fn to_row(&self) -> FinancialRow {
        FinancialRow {
            symbol: self.symbol.code().to_string(),
            date: format_date(self.date),
            open_price: self.open_price,
            close_price: self.close_price,
            volume: self.volume,
            updated_at: self.updated_at.format_sql(),
        }
    }
}

impl TryFrom<StoredRow> for FinancialRecord {
    type Error = ValidationError;

    fn try_from(row: StoredRow) -> Result<Self, Self::Error> {
        let mut record = Self::new(
            Symbol::parse(&row.symbol)?,
            parse_date(&row.date)?,
            row.open_price,
            row.close_price,
            row.volume,
            UtcDateTime::parse_sql(&row.updated_at)?,
        )?;
        record.id = Some(row.id);
        record.created_at = Some(UtcDateTime::parse_sql(&row.created_at)?);
        Ok(record)
    }
}

fn validate_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn serialize_date<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_date(*date))
}

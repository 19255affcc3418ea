//! Entity descriptors driving generated SQL.
//!
//! Table and column identifiers are compile-time constants; values are always
//! bound as statement parameters.

use crate::{FinancialRow, WarehouseError};

/// Storage type of a column, used to pick the parameter cast for `DuckDB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Date,
    Double,
    UnsignedBigInt,
    Timestamp,
}

/// A writable column of an entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: ColumnType,
}

impl Column {
    const fn new(name: &'static str, sql_type: ColumnType) -> Self {
        Self { name, sql_type }
    }

    fn duckdb_placeholder(self) -> &'static str {
        match self.sql_type {
            ColumnType::Date => "CAST(? AS DATE)",
            ColumnType::Timestamp => "CAST(? AS TIMESTAMP)",
            ColumnType::Text | ColumnType::Double | ColumnType::UnsignedBigInt => "?",
        }
    }
}

/// Target entity of an insert or bulk upsert.
///
/// `columns` lists the values supplied by the caller in bind order; `key`
/// names the uniqueness constraint used for conflict detection. Every column
/// outside the key is overwritten on conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityTable {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub key: &'static [&'static str],
}

const FINANCIAL_DATA: EntityTable = EntityTable {
    name: "financial_data",
    columns: &[
        Column::new("symbol", ColumnType::Text),
        Column::new("date", ColumnType::Date),
        Column::new("open_price", ColumnType::Double),
        Column::new("close_price", ColumnType::Double),
        Column::new("volume", ColumnType::UnsignedBigInt),
        Column::new("updated_at", ColumnType::Timestamp),
    ],
    key: &["symbol", "date"],
};

impl EntityTable {
    /// The daily price table, unique on `(symbol, date)`.
    pub fn financial_data() -> &'static EntityTable {
        &FINANCIAL_DATA
    }

    pub fn update_columns(&self) -> impl Iterator<Item = &Column> + '_ {
        self.columns
            .iter()
            .filter(move |column| !self.key.contains(&column.name))
    }

    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|column| column.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn key_list(&self) -> String {
        self.key.join(", ")
    }

    /// Reject tables whose column count does not match the row binder.
    pub(crate) fn ensure_binds_financial_rows(&self) -> Result<(), WarehouseError> {
        if self.columns.len() != FinancialRow::ARITY {
            return Err(WarehouseError::UnsupportedOperation(format!(
                "table '{}' has {} columns but financial rows bind {}",
                self.name,
                self.columns.len(),
                FinancialRow::ARITY
            )));
        }
        if self.key.is_empty() || self.update_columns().next().is_none() {
            return Err(WarehouseError::UnsupportedOperation(format!(
                "table '{}' needs a key and at least one updatable column",
                self.name
            )));
        }
        Ok(())
    }

    fn duckdb_row_placeholder(&self) -> String {
        let placeholders = self
            .columns
            .iter()
            .map(|column| column.duckdb_placeholder())
            .collect::<Vec<_>>()
            .join(", ");
        format!("({placeholders})")
    }

    /// Multi-row `INSERT ... ON CONFLICT DO UPDATE` for `row_count` rows.
    pub fn duckdb_upsert_sql(&self, row_count: usize) -> String {
        let row = self.duckdb_row_placeholder();
        let values = vec![row.as_str(); row_count.max(1)].join(", ");
        let updates = self
            .update_columns()
            .map(|column| format!("{name} = excluded.{name}", name = column.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {table} ({columns}) VALUES {values} \
             ON CONFLICT ({key}) DO UPDATE SET {updates}",
            table = self.name,
            columns = self.column_list(),
            key = self.key_list(),
        )
    }

    /// Single-row insert returning the generated primary key.
    pub fn duckdb_insert_sql(&self) -> String {
        format!(
            "INSERT INTO {table} ({columns}) VALUES {row} RETURNING id",
            table = self.name,
            columns = self.column_list(),
            row = self.duckdb_row_placeholder(),
        )
    }

    /// Trailing clause of a MySQL multi-row upsert.
    pub fn mysql_upsert_suffix(&self) -> String {
        let updates = self
            .update_columns()
            .map(|column| format!("{name} = VALUES({name})", name = column.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" ON DUPLICATE KEY UPDATE {updates}")
    }
}

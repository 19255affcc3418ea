//! Networked MySQL engine.

use std::time::Duration;

use futures::TryStreamExt;
use serde_json::Value;
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{
    MySql, MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions, MySqlRow,
};
use sqlx::{Column as _, Executor, QueryBuilder, Row, Statement as _, TypeInfo, ValueRef};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::query::json_float;
use crate::{
    batches, BulkUpsertReport, Engine, EntityTable, FinancialRow, QueryPolicy, QueryResult,
    RecordFilter, RecordStore, SqlColumn, SqlScript, Statement, StatementKind, StoreFuture,
    StoredRow, WarehouseError, DEFAULT_MAX_BULK_OPERATIONS,
};

const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const CREATE_FINANCIAL_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS financial_data (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
    symbol ENUM('AAPL', 'IBM') NOT NULL,
    date DATE NOT NULL,
    open_price DOUBLE NOT NULL,
    close_price DOUBLE NOT NULL,
    volume BIGINT UNSIGNED NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE KEY unique_symbol_per_date_index (symbol, date)
) ENGINE = InnoDB
"#;

/// Connection settings for the MySQL engine.
#[derive(Clone)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub max_bulk_operations: usize,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 3306,
            user: String::from("root"),
            password: String::new(),
            database: String::from("pricebook"),
            max_connections: 5,
            acquire_timeout_ms: 5_000,
            max_bulk_operations: DEFAULT_MAX_BULK_OPERATIONS,
        }
    }
}

impl std::fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .field("max_bulk_operations", &self.max_bulk_operations)
            .finish()
    }
}

/// Record store over a MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    max_bulk_operations: usize,
}

impl MySqlStore {
    /// Connect, then create the table if it does not exist.
    pub async fn connect(config: &MySqlConfig) -> Result<Self, WarehouseError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms.max(1)))
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            max_bulk_operations: config.max_bulk_operations,
        };
        store.initialize().await?;
        tracing::info!(host = %config.host, database = %config.database, "mysql store ready");
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), WarehouseError> {
        sqlx::query(CREATE_FINANCIAL_DATA).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_batch(
        &self,
        table: &EntityTable,
        batch: &[FinancialRow],
    ) -> Result<(), WarehouseError> {
        for row in batch {
            row.validate()?;
        }
        let mut statement = upsert_statement(table, batch);

        // Dropping an uncommitted sqlx transaction issues ROLLBACK.
        let mut transaction = self.pool.begin().await?;
        statement.build().execute(&mut *transaction).await?;
        transaction.commit().await?;
        Ok(())
    }

    /// A lone reading statement runs on a pooled connection; anything else
    /// runs in one transaction that is rolled back if a statement fails or
    /// the caller's timeout drops this future.
    async fn run_script(
        &self,
        script: &SqlScript,
        policy: &QueryPolicy,
    ) -> Result<QueryResult, WarehouseError> {
        if let [statement] = script.statements() {
            if statement.kind() == StatementKind::Read {
                let mut connection = self.pool.acquire().await?;
                return read_rows(&mut connection, statement, policy).await;
            }
        }

        let mut transaction = self.pool.begin().await?;
        let mut result = QueryResult::default();
        let mut rows_affected = 0_u64;
        for statement in script.statements() {
            if statement.kind() == StatementKind::Read {
                result = read_rows(&mut transaction, statement, policy).await?;
            } else {
                rows_affected += sqlx::query(statement.sql())
                    .execute(&mut *transaction)
                    .await?
                    .rows_affected();
            }
        }
        transaction.commit().await?;

        result.rows_affected = rows_affected;
        tracing::debug!(
            statements = script.statements().len(),
            rows_affected,
            "raw script committed"
        );
        Ok(result)
    }
}

/// Multi-row `INSERT ... ON DUPLICATE KEY UPDATE` with one bound tuple per row.
fn upsert_statement<'args>(
    table: &EntityTable,
    batch: &'args [FinancialRow],
) -> QueryBuilder<'args, MySql> {
    let mut builder: QueryBuilder<'args, MySql> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", table.name, table.column_list()));
    builder.push_values(batch, |mut values, row| {
        values
            .push_bind(row.symbol.as_str())
            .push_bind(row.date.as_str())
            .push_bind(row.open_price)
            .push_bind(row.close_price)
            .push_bind(row.volume)
            .push_bind(row.updated_at.as_str());
    });
    builder.push(table.mysql_upsert_suffix());
    builder
}

async fn read_rows(
    connection: &mut MySqlConnection,
    statement: &Statement,
    policy: &QueryPolicy,
) -> Result<QueryResult, WarehouseError> {
    let prepared = (&mut *connection).prepare(statement.sql()).await?;
    let columns: Vec<SqlColumn> = prepared
        .columns()
        .iter()
        .map(|column| SqlColumn {
            name: column.name().to_owned(),
            r#type: column.type_info().name().to_owned(),
        })
        .collect();

    let mut cursor = prepared.query().fetch(&mut *connection);
    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = cursor.try_next().await? {
        if rows.len() == policy.max_rows {
            truncated = true;
            break;
        }
        let values = (0..row.len())
            .map(|index| json_value(&row, index))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }

    Ok(QueryResult::with_rows(columns, rows, truncated))
}

fn json_value(row: &MySqlRow, index: usize) -> Result<Value, WarehouseError> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = row.columns()[index].type_info().name();
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::from(row.try_get::<i64, _>(index)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => Value::from(row.try_get::<u64, _>(index)?),
        "FLOAT" => json_float(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => json_float(row.try_get(index)?),
        "DATE" => Value::String(row.try_get::<Date, _>(index)?.to_string()),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<OffsetDateTime, _>(index)?
            .format(DATETIME_FORMAT)
            .map_or(Value::Null, Value::String),
        "TIME" => Value::String(row.try_get::<MySqlTime, _>(index)?.to_string()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => {
            Value::String(String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(index)?).into_owned())
        }
        // DECIMAL, ENUM, SET, JSON and the text types arrive as text.
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

impl RecordStore for MySqlStore {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn bulk_upsert<'a>(
        &'a self,
        table: &'a EntityTable,
        rows: Vec<FinancialRow>,
    ) -> StoreFuture<'a, BulkUpsertReport> {
        Box::pin(async move {
            table.ensure_binds_financial_rows()?;
            let mut report = BulkUpsertReport::default();
            for batch in batches(&rows, self.max_bulk_operations) {
                self.upsert_batch(table, batch)
                    .await
                    .map_err(|error| WarehouseError::storage(report.batches_committed, error))?;
                report.batches_committed += 1;
                report.rows_written += batch.len();
                tracing::debug!(
                    table = table.name,
                    batch = report.batches_committed,
                    rows = batch.len(),
                    "committed upsert batch"
                );
            }
            Ok(report)
        })
    }

    fn insert<'a>(&'a self, table: &'a EntityTable, row: FinancialRow) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            table.ensure_binds_financial_rows()?;
            row.validate()?;
            let placeholders = vec!["?"; table.columns.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                table.name,
                table.column_list()
            );
            let result = sqlx::query(sql.as_str())
                .bind(row.symbol.as_str())
                .bind(row.date.as_str())
                .bind(row.open_price)
                .bind(row.close_price)
                .bind(row.volume)
                .bind(row.updated_at.as_str())
                .execute(&self.pool)
                .await?;
            Ok(result.last_insert_id())
        })
    }

    fn count<'a>(
        &'a self,
        table: &'a EntityTable,
        filter: &'a RecordFilter,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut builder: QueryBuilder<'_, MySql> =
                QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", table.name));
            push_filter(&mut builder, filter);
            let count: i64 = builder.build().fetch_one(&self.pool).await?.try_get(0)?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    fn fetch_page<'a>(
        &'a self,
        table: &'a EntityTable,
        filter: &'a RecordFilter,
        page: u64,
        per_page: u64,
    ) -> StoreFuture<'a, Vec<StoredRow>> {
        Box::pin(async move {
            if page == 0 || per_page == 0 {
                return Err(WarehouseError::QueryRejected(String::from(
                    "page and per_page must be greater than zero",
                )));
            }

            let mut builder: QueryBuilder<'_, MySql> = QueryBuilder::new(format!(
                "SELECT id, CAST(symbol AS CHAR) AS symbol, DATE_FORMAT(date, '%Y-%m-%d') AS date, \
                 open_price, close_price, volume, \
                 DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s') AS created_at, \
                 DATE_FORMAT(updated_at, '%Y-%m-%d %H:%i:%s') AS updated_at FROM {}",
                table.name
            ));
            push_filter(&mut builder, filter);
            builder
                .push(" ORDER BY id LIMIT ")
                .push_bind(per_page)
                .push(" OFFSET ")
                .push_bind((page - 1).saturating_mul(per_page));

            let rows = builder.build().fetch_all(&self.pool).await?;
            rows.iter().map(stored_row).collect()
        })
    }

    fn execute_query<'a>(
        &'a self,
        sql: &'a str,
        policy: QueryPolicy,
    ) -> StoreFuture<'a, QueryResult> {
        Box::pin(async move {
            let script = SqlScript::authorize(sql, &policy)?;
            tokio::time::timeout(policy.timeout, self.run_script(&script, &policy))
                .await
                .map_err(|_| policy.timeout_error())?
        })
    }
}

fn push_filter<'args>(builder: &mut QueryBuilder<'args, MySql>, filter: &'args RecordFilter) {
    let mut separator = " WHERE ";
    if let Some(symbol) = &filter.symbol {
        builder.push(separator).push("symbol = ").push_bind(symbol.as_str());
        separator = " AND ";
    }
    if let Some(start_date) = &filter.start_date {
        builder.push(separator).push("date >= ").push_bind(start_date.as_str());
        separator = " AND ";
    }
    if let Some(end_date) = &filter.end_date {
        builder.push(separator).push("date <= ").push_bind(end_date.as_str());
    }
}

fn stored_row(row: &MySqlRow) -> Result<StoredRow, WarehouseError> {
    Ok(StoredRow {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        date: row.try_get("date")?,
        open_price: row.try_get("open_price")?,
        close_price: row.try_get("close_price")?,
        volume: row.try_get("volume")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_password() {
        let config = MySqlConfig {
            password: String::from("hunter2"),
            ..MySqlConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn upsert_binds_one_tuple_per_row_and_updates_non_key_columns() {
        let batch: Vec<FinancialRow> = ["2024-01-02", "2024-01-03", "2024-01-04"]
            .into_iter()
            .map(|date| FinancialRow {
                symbol: String::from("AAPL"),
                date: String::from(date),
                open_price: 1.0,
                close_price: 2.0,
                volume: 3,
                updated_at: String::from("2024-01-05 00:00:00"),
            })
            .collect();

        let builder = upsert_statement(EntityTable::financial_data(), &batch);

        let tuple = "(?, ?, ?, ?, ?, ?)";
        assert_eq!(
            builder.sql(),
            format!(
                "INSERT INTO financial_data (symbol, date, open_price, close_price, volume, updated_at) \
                 VALUES {tuple}, {tuple}, {tuple} \
                 ON DUPLICATE KEY UPDATE open_price = VALUES(open_price), \
                 close_price = VALUES(close_price), volume = VALUES(volume), \
                 updated_at = VALUES(updated_at)"
            )
        );
    }

    #[test]
    fn filters_render_as_bound_predicates() {
        let filter = RecordFilter {
            symbol: Some(String::from("IBM")),
            start_date: None,
            end_date: Some(String::from("2024-01-31")),
        };
        let mut builder: QueryBuilder<'_, MySql> = QueryBuilder::new("SELECT COUNT(*) FROM t");
        push_filter(&mut builder, &filter);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM t WHERE symbol = ? AND date <= ?"
        );
    }
}

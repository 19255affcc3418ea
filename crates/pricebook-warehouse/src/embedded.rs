//! Embedded `DuckDB` engine.

use std::fs;
use std::path::Path;

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params, Connection, ToSql};
use serde_json::Value;
use time::Date;

use crate::duckdb::DuckDbConnectionManager;
use crate::query::{json_float, Deadline};
use crate::{
    batches, collapse_duplicate_keys, migrations, BulkUpsertReport, Engine, EntityTable,
    FinancialRow, QueryPolicy, QueryResult, RecordFilter, RecordStore, SqlColumn, SqlScript,
    Statement, StatementKind, StoreFuture, StoredRow, WarehouseConfig, WarehouseError,
};

/// Julian day number of 1970-01-01, the origin of DuckDB `DATE` values.
const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

/// Record store over a local `DuckDB` file.
#[derive(Clone)]
pub struct DuckDbStore {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl DuckDbStore {
    /// Open a store with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open the database file, creating parent directories and the schema.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let store = Self { config, manager };
        store.initialize()?;
        Ok(store)
    }

    /// Apply schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Blocking raw script; see [`RecordStore::execute_query`].
    ///
    /// A lone reading statement runs directly. Anything else runs inside one
    /// [`BatchTransaction`], so a failing statement undoes the ones before it.
    pub fn execute_query_blocking(
        &self,
        sql: &str,
        policy: QueryPolicy,
    ) -> Result<QueryResult, WarehouseError> {
        let script = SqlScript::authorize(sql, &policy)?;
        let connection = self.manager.acquire()?;
        let deadline = policy.deadline();

        if let [statement] = script.statements() {
            if statement.kind() == StatementKind::Read {
                return read_rows(&connection, statement, &policy, &deadline);
            }
        }

        let transaction = BatchTransaction::begin(&connection)?;
        let mut result = QueryResult::default();
        let mut rows_affected = 0_u64;
        for statement in script.statements() {
            if statement.kind() == StatementKind::Read {
                result = read_rows(&connection, statement, &policy, &deadline)?;
            } else {
                let changed = connection.execute(statement.sql(), params![])?;
                rows_affected += u64::try_from(changed).unwrap_or(u64::MAX);
            }
            deadline.check(&policy)?;
        }
        transaction.commit()?;

        result.rows_affected = rows_affected;
        tracing::debug!(
            statements = script.statements().len(),
            rows_affected,
            "raw script committed"
        );
        Ok(result)
    }

    /// Blocking bulk upsert; see [`RecordStore::bulk_upsert`].
    pub fn bulk_upsert_blocking(
        &self,
        table: &EntityTable,
        rows: &[FinancialRow],
    ) -> Result<BulkUpsertReport, WarehouseError> {
        if !self.config.development_mode {
            return Err(WarehouseError::UnsupportedOperation(String::from(
                "bulk upsert on the embedded engine is only available in development mode",
            )));
        }
        table.ensure_binds_financial_rows()?;

        let mut report = BulkUpsertReport::default();
        if rows.is_empty() {
            return Ok(report);
        }

        let connection = self.manager.acquire()?;
        for batch in batches(rows, self.config.max_bulk_operations) {
            upsert_batch(&connection, table, batch)
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
    }

    pub fn insert_blocking(
        &self,
        table: &EntityTable,
        row: &FinancialRow,
    ) -> Result<u64, WarehouseError> {
        table.ensure_binds_financial_rows()?;
        row.validate()?;
        let connection = self.manager.acquire()?;
        let params = row_params(row);
        let id = connection.query_row(
            table.duckdb_insert_sql().as_str(),
            params.as_slice(),
            |result| result.get::<_, u64>(0),
        )?;
        Ok(id)
    }

    pub fn count_blocking(
        &self,
        table: &EntityTable,
        filter: &RecordFilter,
    ) -> Result<u64, WarehouseError> {
        let connection = self.manager.acquire()?;
        let (clause, values) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM {}{clause}", table.name);
        let params: Vec<&dyn ToSql> = values.iter().map(|value| value as &dyn ToSql).collect();
        let count: i64 = connection.query_row(sql.as_str(), params.as_slice(), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub fn fetch_page_blocking(
        &self,
        table: &EntityTable,
        filter: &RecordFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Vec<StoredRow>, WarehouseError> {
        if page == 0 || per_page == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "page and per_page must be greater than zero",
            )));
        }

        let connection = self.manager.acquire()?;
        let (clause, values) = where_clause(filter);
        let sql = format!(
            "SELECT id, symbol, CAST(date AS VARCHAR), open_price, close_price, volume, \
             strftime(created_at, '%Y-%m-%d %H:%M:%S'), strftime(updated_at, '%Y-%m-%d %H:%M:%S') \
             FROM {table}{clause} ORDER BY id LIMIT {limit} OFFSET {offset}",
            table = table.name,
            limit = per_page,
            offset = (page - 1).saturating_mul(per_page),
        );
        let params: Vec<&dyn ToSql> = values.iter().map(|value| value as &dyn ToSql).collect();

        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(StoredRow {
                id: row.get(0)?,
                symbol: row.get(1)?,
                date: row.get(2)?,
                open_price: row.get(3)?,
                close_price: row.get(4)?,
                volume: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })?;

        let mut output = Vec::new();
        for row in rows {
            output.push(row?);
        }
        Ok(output)
    }
}

impl RecordStore for DuckDbStore {
    fn engine(&self) -> Engine {
        Engine::DuckDb
    }

    fn bulk_upsert<'a>(
        &'a self,
        table: &'a EntityTable,
        rows: Vec<FinancialRow>,
    ) -> StoreFuture<'a, BulkUpsertReport> {
        let store = self.clone();
        let table = *table;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || store.bulk_upsert_blocking(&table, &rows)).await?
        })
    }

    fn insert<'a>(&'a self, table: &'a EntityTable, row: FinancialRow) -> StoreFuture<'a, u64> {
        let store = self.clone();
        let table = *table;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || store.insert_blocking(&table, &row)).await?
        })
    }

    fn count<'a>(
        &'a self,
        table: &'a EntityTable,
        filter: &'a RecordFilter,
    ) -> StoreFuture<'a, u64> {
        let store = self.clone();
        let table = *table;
        let filter = filter.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || store.count_blocking(&table, &filter)).await?
        })
    }

    fn fetch_page<'a>(
        &'a self,
        table: &'a EntityTable,
        filter: &'a RecordFilter,
        page: u64,
        per_page: u64,
    ) -> StoreFuture<'a, Vec<StoredRow>> {
        let store = self.clone();
        let table = *table;
        let filter = filter.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                store.fetch_page_blocking(&table, &filter, page, per_page)
            })
            .await?
        })
    }

    fn execute_query<'a>(
        &'a self,
        sql: &'a str,
        policy: QueryPolicy,
    ) -> StoreFuture<'a, QueryResult> {
        let store = self.clone();
        let sql = sql.to_owned();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || store.execute_query_blocking(&sql, policy)).await?
        })
    }
}

/// Explicit transaction that rolls back unless committed.
struct BatchTransaction<'c> {
    connection: &'c Connection,
    finished: bool,
}

impl<'c> BatchTransaction<'c> {
    fn begin(connection: &'c Connection) -> Result<Self, WarehouseError> {
        connection.execute_batch("BEGIN TRANSACTION")?;
        Ok(Self {
            connection,
            finished: false,
        })
    }

    fn commit(mut self) -> Result<(), WarehouseError> {
        self.finished = true;
        if let Err(error) = self.connection.execute_batch("COMMIT") {
            let _ = self.connection.execute_batch("ROLLBACK");
            return Err(error.into());
        }
        Ok(())
    }
}

impl Drop for BatchTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.connection.execute_batch("ROLLBACK");
        }
    }
}

fn upsert_batch(
    connection: &Connection,
    table: &EntityTable,
    batch: &[FinancialRow],
) -> Result<(), WarehouseError> {
    for row in batch {
        row.validate()?;
    }
    // DuckDB cannot update the same row twice in one statement.
    let survivors = collapse_duplicate_keys(batch);
    let sql = table.duckdb_upsert_sql(survivors.len());
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(survivors.len() * FinancialRow::ARITY);
    for row in &survivors {
        params.extend(row_params(row));
    }

    let transaction = BatchTransaction::begin(connection)?;
    connection.execute(sql.as_str(), params.as_slice())?;
    transaction.commit()
}

fn row_params(row: &FinancialRow) -> [&dyn ToSql; FinancialRow::ARITY] {
    [
        &row.symbol,
        &row.date,
        &row.open_price,
        &row.close_price,
        &row.volume,
        &row.updated_at,
    ]
}

fn read_rows(
    connection: &Connection,
    statement: &Statement,
    policy: &QueryPolicy,
    deadline: &Deadline,
) -> Result<QueryResult, WarehouseError> {
    let mut prepared = connection.prepare(statement.sql())?;
    let mut cursor = prepared.query(params![])?;

    // Column metadata exists only once the statement has run.
    let columns: Vec<SqlColumn> = cursor
        .as_ref()
        .map(|executed| {
            executed
                .column_names()
                .into_iter()
                .enumerate()
                .map(|(index, name)| SqlColumn {
                    name,
                    r#type: executed.column_type(index).to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = cursor.next()? {
        deadline.check(policy)?;
        if rows.len() == policy.max_rows {
            truncated = true;
            break;
        }
        let values = (0..columns.len())
            .map(|index| row.get::<_, DuckValue>(index).map(json_value))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }

    Ok(QueryResult::with_rows(columns, rows, truncated))
}

fn json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::from(value),
        DuckValue::SmallInt(value) => Value::from(value),
        DuckValue::Int(value) => Value::from(value),
        DuckValue::BigInt(value) => Value::from(value),
        DuckValue::UTinyInt(value) => Value::from(value),
        DuckValue::USmallInt(value) => Value::from(value),
        DuckValue::UInt(value) => Value::from(value),
        DuckValue::UBigInt(value) => Value::from(value),
        DuckValue::HugeInt(value) => i64::try_from(value)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(value.to_string())),
        DuckValue::Float(value) => json_float(f64::from(value)),
        DuckValue::Double(value) => json_float(value),
        DuckValue::Text(value) => Value::String(value),
        DuckValue::Date32(days) => UNIX_EPOCH_JULIAN_DAY
            .checked_add(days)
            .and_then(|julian| Date::from_julian_day(julian).ok())
            .map_or(Value::Null, |date| Value::String(date.to_string())),
        other => Value::String(format!("{other:?}")),
    }
}

fn where_clause(filter: &RecordFilter) -> (String, Vec<String>) {
    let mut predicates = Vec::new();
    let mut values = Vec::new();
    if let Some(symbol) = &filter.symbol {
        predicates.push("symbol = ?");
        values.push(symbol.clone());
    }
    if let Some(start_date) = &filter.start_date {
        predicates.push("date >= CAST(? AS DATE)");
        values.push(start_date.clone());
    }
    if let Some(end_date) = &filter.end_date {
        predicates.push("date <= CAST(? AS DATE)");
        values.push(end_date.clone());
    }

    if predicates.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", predicates.join(" AND ")), values)
    }
}

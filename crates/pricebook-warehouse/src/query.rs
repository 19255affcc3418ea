//! Raw SQL scripts.
//!
//! A script is split into statements, each statement is classified, and the
//! whole script is checked against a [`QueryPolicy`] before any engine sees it.
//! Engines then run the authorized script and report a [`QueryResult`].
//!
//! Two tables belong to the store itself. `financial_data` rows are only
//! written through bulk upsert or insert, so raw `INSERT`/`REPLACE` into it is
//! refused even with write access, and neither table can be created, altered,
//! dropped or truncated from a script.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::{EntityTable, WarehouseError};

pub const DEFAULT_MAX_ROWS: usize = 10_000;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const MIGRATIONS_TABLE: &str = "schema_migrations";

/// Whether a script may change data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Access {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// Limits applied to one raw script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    pub access: Access,
    /// Rows returned from the last reading statement; the rest are dropped.
    pub max_rows: usize,
    /// Wall-clock budget for the whole script.
    pub timeout: Duration,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self::read_only()
    }
}

impl QueryPolicy {
    pub fn read_only() -> Self {
        Self {
            access: Access::ReadOnly,
            max_rows: DEFAULT_MAX_ROWS,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn read_write() -> Self {
        Self {
            access: Access::ReadWrite,
            ..Self::read_only()
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn deadline(&self) -> Deadline {
        Deadline {
            started: Instant::now(),
            budget: self.timeout,
        }
    }

    pub(crate) fn timeout_error(&self) -> WarehouseError {
        WarehouseError::QueryTimeout {
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn validate(&self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "row limit must be greater than zero",
            )));
        }
        if self.timeout.is_zero() {
            return Err(WarehouseError::QueryRejected(String::from(
                "query timeout must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Elapsed-time check for engines that run scripts on a blocking thread.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub(crate) fn check(&self, policy: &QueryPolicy) -> Result<(), WarehouseError> {
        if self.started.elapsed() > self.budget {
            return Err(policy.timeout_error());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Returns rows: `SELECT`, `WITH`, `EXPLAIN`, `SHOW`, `DESCRIBE`.
    Read,
    /// Changes rows: `INSERT`, `REPLACE`, `UPDATE`, `DELETE`.
    Write,
    /// Changes tables: `CREATE`, `ALTER`, `DROP`, `TRUNCATE`, `RENAME`.
    Schema,
}

/// One statement of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    keyword: String,
    kind: StatementKind,
    target: Option<String>,
}

impl Statement {
    fn parse(sql: &str) -> Result<Self, WarehouseError> {
        let body = strip_leading_comments(sql);
        let mut words = body.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_uppercase();
        let kind = match keyword.as_str() {
            "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE" | "DESC" => StatementKind::Read,
            "INSERT" | "REPLACE" | "UPDATE" | "DELETE" => StatementKind::Write,
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "RENAME" => StatementKind::Schema,
            _ => {
                return Err(WarehouseError::QueryRejected(format!(
                    "unsupported statement `{keyword}`"
                )))
            }
        };
        let target = target_table(&keyword, words);

        Ok(Self {
            sql: body.to_owned(),
            keyword,
            kind,
            target,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Leading keyword, upper-cased.
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Unqualified, lower-cased table the statement writes or reshapes, when
    /// it names one.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

/// A raw script that passed its policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlScript {
    statements: Vec<Statement>,
}

impl SqlScript {
    /// Split and classify `sql`, then check it against `policy`.
    pub fn authorize(sql: &str, policy: &QueryPolicy) -> Result<Self, WarehouseError> {
        policy.validate()?;

        let statements = split_statements(sql)
            .into_iter()
            .map(Statement::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if statements.is_empty() {
            return Err(WarehouseError::QueryRejected(String::from(
                "query must not be empty",
            )));
        }

        match policy.access {
            Access::ReadOnly => {
                if statements.len() > 1 {
                    return Err(WarehouseError::QueryRejected(format!(
                        "read-only access runs one statement, got {}",
                        statements.len()
                    )));
                }
                if let Some(statement) = statements.iter().find(|s| s.kind != StatementKind::Read) {
                    return Err(WarehouseError::ReadOnlyViolation {
                        keyword: statement.keyword.clone(),
                    });
                }
            }
            Access::ReadWrite => {
                for statement in &statements {
                    check_managed_tables(statement)?;
                }
            }
        }

        Ok(Self { statements })
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn is_read_only(&self) -> bool {
        self.statements
            .iter()
            .all(|statement| statement.kind == StatementKind::Read)
    }
}

fn check_managed_tables(statement: &Statement) -> Result<(), WarehouseError> {
    let Some(target) = statement.target() else {
        return Ok(());
    };
    let records = EntityTable::financial_data().name;

    match statement.kind {
        StatementKind::Write
            if target == records && matches!(statement.keyword(), "INSERT" | "REPLACE") =>
        {
            Err(WarehouseError::QueryRejected(format!(
                "{records} rows are written through bulk upsert, not raw {}",
                statement.keyword()
            )))
        }
        StatementKind::Schema if target == records || target == MIGRATIONS_TABLE => {
            Err(WarehouseError::QueryRejected(format!(
                "{target} is managed by the store, {} is not allowed",
                statement.keyword()
            )))
        }
        _ => Ok(()),
    }
}

/// Split on `;` outside quoted strings and identifiers; empty pieces are dropped.
fn split_statements(sql: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, ch) in sql.char_indices() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if matches!(ch, '\'' | '"' | '`') => quote = Some(ch),
            None if ch == ';' => {
                pieces.push(&sql[start..index]);
                start = index + 1;
            }
            None => {}
        }
    }
    pieces.push(&sql[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !strip_leading_comments(piece).is_empty())
        .collect()
}

fn strip_leading_comments(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start();
        if let Some(rest) = sql.strip_prefix("--") {
            sql = rest.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return sql.trim_end();
        }
    }
}

fn target_table<'a>(keyword: &str, words: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut words = words.peekable();
    match keyword {
        "INSERT" | "REPLACE" => {
            let mut words = words.skip_while(|word| !word.eq_ignore_ascii_case("INTO"));
            words.next();
            words.next().map(table_name)
        }
        "UPDATE" => words
            .find(|word| {
                !word.eq_ignore_ascii_case("LOW_PRIORITY") && !word.eq_ignore_ascii_case("IGNORE")
            })
            .map(table_name),
        "DELETE" => {
            let mut words = words.skip_while(|word| !word.eq_ignore_ascii_case("FROM"));
            words.next();
            words.next().map(table_name)
        }
        "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "RENAME" => {
            // Only table-level statements carry a target.
            while let Some(word) = words.peek() {
                let upper = word.to_ascii_uppercase();
                match upper.as_str() {
                    "OR" | "REPLACE" | "TEMP" | "TEMPORARY" | "IF" | "NOT" | "EXISTS" => {
                        words.next();
                    }
                    "TABLE" => {
                        words.next();
                        return words
                            .find(|word| {
                                !matches!(
                                    word.to_ascii_uppercase().as_str(),
                                    "IF" | "NOT" | "EXISTS"
                                )
                            })
                            .map(table_name);
                    }
                    _ if keyword == "TRUNCATE" => return words.next().map(table_name),
                    _ => return None,
                }
            }
            None
        }
        _ => None,
    }
}

fn table_name(word: &str) -> String {
    let word = word.split('(').next().unwrap_or_default();
    let unqualified = word.rsplit('.').next().unwrap_or(word);
    unqualified
        .trim_matches(|ch| matches!(ch, '`' | '"' | '\''))
        .to_ascii_lowercase()
}

/// Column metadata for query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

/// Outcome of a raw script: rows from the last reading statement, plus the
/// number of rows changed by writing statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    /// Rows were dropped at the policy's row limit.
    pub truncated: bool,
    pub rows_affected: u64,
}

impl QueryResult {
    pub(crate) fn with_rows(
        columns: Vec<SqlColumn>,
        rows: Vec<Vec<Value>>,
        truncated: bool,
    ) -> Self {
        Self {
            columns,
            row_count: rows.len(),
            rows,
            truncated,
            rows_affected: 0,
        }
    }
}

/// JSON number for an engine float; NaN and infinities become `null`.
pub(crate) fn json_float(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

//! Idempotent schema bootstrap for the embedded engine.

use ::duckdb::{params, Connection};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_financial_data",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS financial_data_id_seq START 1;

CREATE TABLE IF NOT EXISTS financial_data (
    id UBIGINT PRIMARY KEY DEFAULT nextval('financial_data_id_seq'),
    symbol VARCHAR NOT NULL CHECK (symbol IN ('AAPL', 'IBM')),
    date DATE NOT NULL,
    open_price DOUBLE NOT NULL CHECK (open_price >= 0),
    close_price DOUBLE NOT NULL CHECK (close_price >= 0),
    volume UBIGINT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (symbol, date)
);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version VARCHAR PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params![migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            tracing::debug!(version = migration.version, "applying migration");
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params![migration.version],
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_once() {
        let connection = Connection::open_in_memory().expect("in-memory db");
        apply_migrations(&connection).expect("first run");
        apply_migrations(&connection).expect("second run");

        let applied: i64 = connection
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(applied as usize, MIGRATIONS.len());
    }

    #[test]
    fn schema_rejects_symbols_outside_the_closed_set() {
        let connection = Connection::open_in_memory().expect("in-memory db");
        apply_migrations(&connection).expect("migrate");

        let result = connection.execute_batch(
            "INSERT INTO financial_data (symbol, date, open_price, close_price, volume) \
             VALUES ('MSFT', DATE '2024-01-02', 1.0, 1.0, 1)",
        );
        assert!(result.is_err());
    }
}

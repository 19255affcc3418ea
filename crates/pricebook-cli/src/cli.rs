//! CLI argument definitions for pricebook.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `serve` | Run the HTTP API |
//! | `ingest` | Pull the last 14 days from Alpha Vantage and upsert them |
//! | `list` | Page through stored records |
//! | `stats` | Average daily prices and volume for one symbol |
//! | `sql` | Query the embedded DuckDB file directly |
//!
//! Settings come from the environment (and `.env`); `--engine` and
//! `--port` override `DB_ENGINE` and `SERVER_PORT`.
//!
//! # Examples
//!
//! ```bash
//! pricebook ingest
//! pricebook list --symbol IBM --limit 10 --page 2 --pretty
//! pricebook stats --start-date 2024-01-01 --end-date 2024-01-31 --symbol AAPL
//! pricebook sql "SELECT symbol, COUNT(*) FROM financial_data GROUP BY symbol"
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pricebook_warehouse::Engine;

/// Stock price book: ingestion, listing and statistics.
#[derive(Debug, Parser)]
#[command(name = "pricebook", author, version, about)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Storage engine; overrides DB_ENGINE.
    #[arg(long, global = true, value_enum)]
    pub engine: Option<EngineArg>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineArg {
    Duckdb,
    Mysql,
}

impl From<EngineArg> for Engine {
    fn from(value: EngineArg) -> Self {
        match value {
            EngineArg::Duckdb => Engine::DuckDb,
            EngineArg::Mysql => Engine::MySql,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API until interrupted.
    Serve(ServeArgs),

    /// Fetch recent daily prices for every tracked symbol and upsert them.
    Ingest(IngestArgs),

    /// List stored records, one page at a time.
    List(ListArgs),

    /// Average daily open price, close price and volume.
    Stats(StatsArgs),

    /// Run SQL against the configured store (DuckDB file or MySQL).
    Sql(SqlArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on; overrides SERVER_PORT.
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// File holding the Alpha Vantage key; overrides API_KEY_PATH.
    #[arg(long)]
    pub api_key_path: Option<PathBuf>,

    /// Per-request timeout in milliseconds; overrides HTTP_TIMEOUT_MS.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// First date to include (YYYY-MM-DD).
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last date to include (YYYY-MM-DD).
    #[arg(long)]
    pub end_date: Option<String>,

    /// Ticker code or name (AAPL, APPLE, IBM).
    #[arg(long)]
    pub symbol: Option<String>,

    #[arg(long, default_value_t = 5)]
    pub limit: u64,

    #[arg(long, default_value_t = 1)]
    pub page: u64,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[arg(long)]
    pub start_date: String,

    #[arg(long)]
    pub end_date: String,

    #[arg(long)]
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct SqlArgs {
    /// SQL query to execute.
    pub query: String,

    /// Allow statements that change data or tables, run as one transaction.
    ///
    /// Without this flag, a single SELECT, WITH, EXPLAIN, SHOW or DESCRIBE
    /// statement is allowed. Rows in financial_data are only written by
    /// `ingest`, never by raw INSERT.
    #[arg(long, default_value_t = false)]
    pub write: bool,

    /// Maximum number of rows to return.
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    /// Query timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_defaults_match_the_api() {
        let cli = Cli::try_parse_from(["pricebook", "list", "--symbol", "IBM"]).expect("parse");
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.limit, 5);
        assert_eq!(args.page, 1);
        assert_eq!(args.symbol.as_deref(), Some("IBM"));
    }

    #[test]
    fn stats_requires_every_filter() {
        let missing = Cli::try_parse_from(["pricebook", "stats", "--symbol", "IBM"]);
        assert!(missing.is_err());
    }

    #[test]
    fn engine_flag_is_global() {
        let cli = Cli::try_parse_from(["pricebook", "serve", "--engine", "mysql", "--port", "9000"])
            .expect("parse");
        assert_eq!(cli.engine.map(Engine::from), Some(Engine::MySql));
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, Some(9000));
    }
}

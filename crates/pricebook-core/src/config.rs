//! Process settings resolved from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use pricebook_warehouse::{
    Engine, MySqlConfig, StoreConfig, WarehouseConfig, DEFAULT_MAX_BULK_OPERATIONS,
};

use crate::ConfigError;

pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_API_KEY_PATH: &str = "conf/api_key";
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

impl AppEnv {
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

/// Everything the server and the ingestion job need at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_env: AppEnv,
    pub server_port: u16,
    pub store: StoreConfig,
    pub api_key_path: PathBuf,
    /// CORS origins; `["*"]` allows any.
    pub allowed_hosts: Vec<String>,
    pub http_timeout_ms: u64,
    pub max_bulk_operations: usize,
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup`; unset and blank variables take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let app_env = match var("APP_ENV") {
            Some(value) => AppEnv::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                name: "APP_ENV",
                value,
                reason: String::from("expected development or production"),
            })?,
            None => AppEnv::default(),
        };

        let engine = match var("DB_ENGINE") {
            Some(value) => Engine::from_str(value.trim())?,
            None => Engine::DuckDb,
        };

        let server_port = parse_or("SERVER_PORT", var("SERVER_PORT"), DEFAULT_SERVER_PORT)?;
        let max_bulk_operations = parse_or(
            "MAX_BULK_OPERATIONS",
            var("MAX_BULK_OPERATIONS"),
            DEFAULT_MAX_BULK_OPERATIONS,
        )?;
        if max_bulk_operations == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_BULK_OPERATIONS",
                value: String::from("0"),
                reason: String::from("must be at least 1"),
            });
        }
        let http_timeout_ms =
            parse_or("HTTP_TIMEOUT_MS", var("HTTP_TIMEOUT_MS"), DEFAULT_HTTP_TIMEOUT_MS)?;

        let pricebook_home = var("PRICEBOOK_HOME")
            .map(PathBuf::from)
            .or_else(|| var("HOME").map(|home| PathBuf::from(home).join(".pricebook")))
            .unwrap_or_else(|| PathBuf::from(".pricebook"));
        let db_path = var("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| pricebook_home.join("pricebook.duckdb"));

        let duckdb = WarehouseConfig {
            pricebook_home,
            db_path,
            max_bulk_operations,
            development_mode: app_env.is_development(),
            ..WarehouseConfig::default()
        };

        let mysql_defaults = MySqlConfig::default();
        let mysql = MySqlConfig {
            host: var("DB_HOST").unwrap_or(mysql_defaults.host),
            port: parse_or("DB_PORT", var("DB_PORT"), mysql_defaults.port)?,
            user: var("DB_USER").unwrap_or(mysql_defaults.user),
            password: lookup("DB_PASSWORD").unwrap_or(mysql_defaults.password),
            database: var("DB_NAME").unwrap_or(mysql_defaults.database),
            max_bulk_operations,
            ..mysql_defaults
        };

        let allowed_hosts = var("ALLOWED_HOSTS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|host| !host.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|hosts| !hosts.is_empty())
            .unwrap_or_else(|| vec![String::from("*")]);

        Ok(Self {
            app_env,
            server_port,
            store: StoreConfig {
                engine,
                duckdb,
                mysql,
            },
            api_key_path: var("API_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_API_KEY_PATH)),
            allowed_hosts,
            http_timeout_ms,
            max_bulk_operations,
        })
    }

    pub fn allows_any_host(&self) -> bool {
        self.allowed_hosts.iter().any(|host| host == "*")
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pricebook_warehouse::WarehouseError;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = settings(&[("HOME", "/home/alice")]).expect("settings");

        assert_eq!(settings.app_env, AppEnv::Development);
        assert_eq!(settings.server_port, 8080);
        assert_eq!(settings.store.engine, Engine::DuckDb);
        assert_eq!(
            settings.store.duckdb.db_path,
            PathBuf::from("/home/alice/.pricebook/pricebook.duckdb")
        );
        assert!(settings.store.duckdb.development_mode);
        assert_eq!(settings.max_bulk_operations, 50);
        assert_eq!(settings.api_key_path, PathBuf::from("conf/api_key"));
        assert!(settings.allows_any_host());
        assert_eq!(settings.http_timeout_ms, 10_000);
        assert_eq!(settings.store.mysql.port, 3306);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let settings = settings(&[
            ("APP_ENV", "production"),
            ("SERVER_PORT", "9000"),
            ("DB_ENGINE", "MySQL"),
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "3307"),
            ("DB_PASSWORD", "hunter2"),
            ("MAX_BULK_OPERATIONS", "25"),
            ("ALLOWED_HOSTS", "https://a.example, https://b.example"),
        ])
        .expect("settings");

        assert_eq!(settings.app_env, AppEnv::Production);
        assert!(!settings.store.duckdb.development_mode);
        assert_eq!(settings.server_port, 9000);
        assert_eq!(settings.store.engine, Engine::MySql);
        assert_eq!(settings.store.mysql.host, "db.internal");
        assert_eq!(settings.store.mysql.port, 3307);
        assert_eq!(settings.store.mysql.max_bulk_operations, 25);
        assert_eq!(settings.store.duckdb.max_bulk_operations, 25);
        assert_eq!(
            settings.allowed_hosts,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(!format!("{settings:?}").contains("hunter2"));
    }

    #[test]
    fn unknown_engine_is_a_configuration_error() {
        let error = settings(&[("DB_ENGINE", "oracle")]).expect_err("unknown engine");
        assert!(matches!(
            error,
            ConfigError::Warehouse(WarehouseError::UnknownEngine(_))
        ));
    }

    #[test]
    fn malformed_numbers_name_the_variable() {
        let error = settings(&[("SERVER_PORT", "eighty")]).expect_err("bad port");
        assert!(matches!(
            error,
            ConfigError::InvalidValue { name: "SERVER_PORT", .. }
        ));

        let error = settings(&[("MAX_BULK_OPERATIONS", "0")]).expect_err("zero bound");
        assert!(matches!(
            error,
            ConfigError::InvalidValue { name: "MAX_BULK_OPERATIONS", .. }
        ));

        let error = settings(&[("APP_ENV", "staging")]).expect_err("bad env");
        assert!(matches!(error, ConfigError::InvalidValue { name: "APP_ENV", .. }));
    }
}

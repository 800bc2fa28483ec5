//! Store configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;

/// Environment variable holding the connection string.
pub const DATABASE_URL_ENV: &str = "COINWATCH_DATABASE_URL";

/// Fallback environment variable for the connection string.
pub const FALLBACK_DATABASE_URL_ENV: &str = "DATABASE_URL";

const LAZY_LOADING_ENV: &str = "COINWATCH_LAZY_LOADING";
const HARD_DELETE_ENV: &str = "COINWATCH_HARD_DELETE";

/// Configuration of a [`PartitionedStore`](crate::PartitionedStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `postgres://…`, `postgresql://…` or `sqlite:…`.
    pub connection_string: String,
    /// Fetch row values on first access instead of with the key.
    #[serde(default = "default_lazy_loading")]
    pub lazy_loading: bool,
    /// Physically delete rows instead of marking them deleted.
    #[serde(default)]
    pub hard_delete: bool,
}

fn default_lazy_loading() -> bool {
    true
}

impl StoreConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            lazy_loading: default_lazy_loading(),
            hard_delete: false,
        }
    }

    /// In-memory SQLite store, the database lives as long as the store's connection.
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    pub fn with_lazy_loading(mut self, lazy_loading: bool) -> Self {
        self.lazy_loading = lazy_loading;
        self
    }

    pub fn with_hard_delete(mut self, hard_delete: bool) -> Self {
        self.hard_delete = hard_delete;
        self
    }

    /// Loads the configuration from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let connection_string = std::env::var(DATABASE_URL_ENV)
            .or_else(|_| std::env::var(FALLBACK_DATABASE_URL_ENV))
            .map_err(|_| {
                Error::Config(format!(
                    "{DATABASE_URL_ENV} or {FALLBACK_DATABASE_URL_ENV} must be set"
                ))
            })?;

        let mut config = Self::new(connection_string);
        if let Some(lazy_loading) = env_flag(LAZY_LOADING_ENV)? {
            config.lazy_loading = lazy_loading;
        }
        if let Some(hard_delete) = env_flag(HARD_DELETE_ENV)? {
            config.hard_delete = hard_delete;
        }
        Ok(config)
    }

    pub(crate) fn connect_options(&self) -> Result<ConnectOptions> {
        ConnectOptions::parse(&self.connection_string)
    }
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => parse_flag(&raw)
            .map(Some)
            .ok_or_else(|| Error::Config(format!("{name} must be a boolean, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Backend-specific connection options.
#[derive(Debug, Clone)]
pub(crate) enum ConnectOptions {
    Postgres(PgConnectOptions),
    Sqlite(SqliteConnectOptions),
}

impl ConnectOptions {
    fn parse(connection_string: &str) -> Result<Self> {
        let scheme = connection_string
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();

        match scheme.as_str() {
            "postgres" | "postgresql" => PgConnectOptions::from_str(connection_string)
                .map(Self::Postgres)
                .map_err(|err| Error::Config(format!("Invalid PostgreSQL URL: {err}"))),
            "sqlite" => SqliteConnectOptions::from_str(connection_string)
                .map(|options| Self::Sqlite(options.create_if_missing(true)))
                .map_err(|err| Error::Config(format!("Invalid SQLite URL: {err}"))),
            _ => Err(Error::Config(format!(
                "Unsupported backend in connection string, expected postgres:// or sqlite: (got {scheme:?})"
            ))),
        }
    }
}

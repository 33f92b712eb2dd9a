//! Server configuration.
//!
//! # Environment Variables
//!
//! - `HOST`: bind address (default: `0.0.0.0`)
//! - `PORT`: bind port (default: `8000`)
//! - `STORAGE_MODE`: `in_memory` (default) | `sqlite` | `postgres`
//! - `DATABASE_URL`: `PostgreSQL` URL (required when `STORAGE_MODE=postgres`),
//!   or the `SQLite` file path (default: `todos.db`)
//! - `TITLE_MAX_CHARS`: longest accepted title (default: `64`)
//! - `UNIQUE_TITLES`: reject duplicate titles (default: `true`)

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;
use todo_sync::domain::TodoConstraints;
use todo_sync::domain::validation::SERVER_TITLE_MAX_CHARS;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SQLITE_PATH: &str = "todos.db";

// =============================================================================
// Storage Mode
// =============================================================================

/// Backend holding the todos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Process-local storage, lost on restart.
    #[default]
    InMemory,
    /// Embedded `SQLite` file.
    Sqlite,
    /// `PostgreSQL` server.
    Postgres,
}

impl FromStr for StorageMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(ConfigError::InvalidStorageMode(value.to_string())),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Invalid or missing configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid storage mode: '{0}'. Expected 'in_memory', 'sqlite' or 'postgres'")]
    InvalidStorageMode(String),

    #[error("Invalid value for {name}: '{value}' ({message})")]
    InvalidValue {
        name: &'static str,
        value: String,
        message: String,
    },

    #[error("DATABASE_URL environment variable is required when STORAGE_MODE=postgres")]
    MissingDatabaseUrl,

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
}

// =============================================================================
// Server Config
// =============================================================================

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage_mode: StorageMode,
    pub database_url: Option<String>,
    pub title_max_chars: usize,
    pub unique_titles: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            storage_mode: StorageMode::default(),
            database_url: None,
            title_max_chars: SERVER_TITLE_MAX_CHARS,
            unique_titles: true,
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable holds an invalid value or
    /// `DATABASE_URL` is missing for `postgres`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            host: read("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", read("PORT"))?.unwrap_or(defaults.port),
            storage_mode: read("STORAGE_MODE")
                .map(|value| value.parse())
                .transpose()?
                .unwrap_or_default(),
            database_url: read("DATABASE_URL"),
            title_max_chars: parse_var("TITLE_MAX_CHARS", read("TITLE_MAX_CHARS"))?
                .unwrap_or(defaults.title_max_chars),
            unique_titles: parse_flag("UNIQUE_TITLES", read("UNIQUE_TITLES"))?
                .unwrap_or(defaults.unique_titles),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field requirements.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the title limit is zero or `DATABASE_URL`
    /// is missing for `postgres`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.title_max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                name: "TITLE_MAX_CHARS",
                value: "0".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.storage_mode == StorageMode::Postgres && self.database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(())
    }

    /// Returns the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAddress` if host and port do not form
    /// a socket address.
    pub fn address(&self) -> Result<SocketAddr, ConfigError> {
        let address = format!("{}:{}", self.host, self.port);
        address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(address))
    }

    /// `SQLite` file path used in `sqlite` mode.
    pub fn sqlite_path(&self) -> &str {
        self.database_url.as_deref().unwrap_or(DEFAULT_SQLITE_PATH)
    }

    /// Input constraints enforced by the backend.
    pub const fn constraints(&self) -> TodoConstraints {
        TodoConstraints::server().with_title_max_chars(self.title_max_chars)
    }
}

fn parse_var<T>(name: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|value| {
            value.parse().map_err(|error: T::Err| ConfigError::InvalidValue {
                name,
                message: error.to_string(),
                value,
            })
        })
        .transpose()
}

fn parse_flag(name: &'static str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    value
        .map(|value| match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name,
                value,
                message: "expected true or false".to_string(),
            }),
        })
        .transpose()
}

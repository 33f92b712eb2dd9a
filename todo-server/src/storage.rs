//! Runtime backend selection.

use std::sync::Arc;

use todo_store::{PostgresTodoStore, SqliteTodoStore, StoreError, StoreOptions};
use todo_sync::service::{InMemoryTodoService, TodoService};

use crate::config::{ConfigError, ServerConfig, StorageMode};

/// Shared handle to the selected backend.
pub type SharedService = Arc<dyn TodoService>;

/// Errors raised while opening the backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds the CRUD service named by `config.storage_mode`.
#[derive(Debug, Clone)]
pub struct StorageFactory {
    config: ServerConfig,
}

impl StorageFactory {
    #[must_use]
    pub const fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Opens the configured backend, creating its schema if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the database cannot be opened.
    pub async fn create(&self) -> Result<SharedService, StorageError> {
        let options = StoreOptions {
            constraints: self.config.constraints(),
            unique_titles: self.config.unique_titles,
        };

        match self.config.storage_mode {
            StorageMode::InMemory => Ok(Arc::new(
                InMemoryTodoService::new()
                    .with_constraints(options.constraints)
                    .with_unique_titles(options.unique_titles),
            )),
            StorageMode::Sqlite => {
                let path = self.config.sqlite_path();
                tracing::info!(path, "Opening SQLite store");
                Ok(Arc::new(SqliteTodoStore::open(path, options).await?))
            }
            StorageMode::Postgres => {
                let url = self
                    .config
                    .database_url
                    .as_deref()
                    .ok_or(ConfigError::MissingDatabaseUrl)?;
                tracing::info!("Connecting to PostgreSQL store");
                Ok(Arc::new(PostgresTodoStore::connect(url, options).await?))
            }
        }
    }
}

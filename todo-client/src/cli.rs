//! Command-line arguments.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use todo_store::{SqliteTodoStore, StoreOptions};
use todo_sync::cache::InsertPosition;
use todo_sync::domain::TodoConstraints;
use todo_sync::domain::validation::CLIENT_TITLE_MAX_CHARS;
use todo_sync::reconcile::{ReconcilerConfig, RollbackScope};
use todo_sync::service::{
    FailInjectingService, FailInjectionConfig, HttpTodoService, TodoService,
};

#[derive(Parser, Debug)]
#[command(name = "todo-client")]
#[command(about = "Todo list with optimistic updates")]
pub struct Cli {
    #[command(subcommand)]
    pub backend: Backend,

    #[command(flatten)]
    pub options: ClientOptions,
}

#[derive(Subcommand, Debug)]
pub enum Backend {
    /// Talk to a todo server over HTTP
    Remote {
        /// Server base URL
        #[arg(long, env = "TODO_SERVER_URL", default_value = "http://localhost:8000")]
        url: String,

        /// Request timeout in milliseconds
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// Keep todos in a local SQLite file
    Local {
        /// Database file, created if missing
        #[arg(long, env = "TODO_DATABASE", default_value = "todos.db")]
        database: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ClientOptions {
    /// Longest title accepted before sending
    #[arg(long, global = true, default_value_t = CLIENT_TITLE_MAX_CHARS)]
    pub title_max_chars: usize,

    /// What a failed mutation restores
    #[arg(long, global = true, value_enum, default_value_t = Rollback::Entry)]
    pub rollback: Rollback,

    /// Where new todos appear before the server answers
    #[arg(long, global = true, value_enum, default_value_t = Insert::Head)]
    pub insert: Insert,

    /// Fraction of requests that fail on purpose (0.0 - 1.0)
    #[arg(long, global = true, default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Artificial latency added to every request
    #[arg(long, global = true, default_value_t = 0)]
    pub delay_ms: u64,

    /// Seed for the failure and latency draws
    #[arg(long, global = true)]
    pub seed: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    /// Undo only the affected todo
    Entry,
    /// Restore the whole list as it was before the mutation
    Cache,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Head,
    Tail,
}

impl ClientOptions {
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            rollback: match self.rollback {
                Rollback::Entry => RollbackScope::Entry,
                Rollback::Cache => RollbackScope::Cache,
            },
            insert: match self.insert {
                Insert::Head => InsertPosition::Head,
                Insert::Tail => InsertPosition::Tail,
            },
            constraints: TodoConstraints::client().with_title_max_chars(self.title_max_chars),
        }
    }

    /// Returns the fail injection settings, or `None` when no chaos flag is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the failure rate is outside `0.0..=1.0`.
    pub fn fail_injection(&self) -> anyhow::Result<Option<FailInjectionConfig>> {
        let config = FailInjectionConfig {
            failure_rate: self.failure_rate,
            delay_min_ms: self.delay_ms,
            delay_max_ms: self.delay_ms,
            seed: self.seed,
            ..FailInjectionConfig::default()
        };
        config.validate()?;
        Ok(config.is_enabled().then_some(config))
    }
}

impl Cli {
    /// Opens the selected backend, wrapped in the fail injector when asked.
    ///
    /// # Errors
    ///
    /// Returns an error if the local database cannot be opened or the chaos
    /// flags are invalid.
    pub async fn open_service(&self) -> anyhow::Result<Arc<dyn TodoService>> {
        let service: Arc<dyn TodoService> = match &self.backend {
            Backend::Remote { url, timeout_ms } => Arc::new(
                HttpTodoService::new(url.as_str())
                    .with_timeout(Duration::from_millis(*timeout_ms)),
            ),
            Backend::Local { database } => {
                let store = SqliteTodoStore::open(database, StoreOptions::default())
                    .await
                    .with_context(|| format!("failed to open {}", database.display()))?;
                Arc::new(store)
            }
        };

        match self.options.fail_injection()? {
            Some(config) => {
                tracing::info!(
                    failure_rate = config.failure_rate,
                    delay_ms = config.delay_max_ms,
                    "Fail injection enabled"
                );
                Ok(Arc::new(FailInjectingService::new(service, config)))
            }
            None => Ok(service),
        }
    }
}

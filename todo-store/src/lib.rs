//! Persistent stores for todos.
//!
//! Both stores implement [`todo_sync::service::TodoService`] over a single
//! `todos` table:
//!
//! - [`SqliteTodoStore`]: embedded file (or in-memory) database used by the
//!   local client and by the server's `sqlite` storage mode
//! - [`PostgresTodoStore`]: the server's `postgres` storage mode
//!
//! The schema is created on connect and existing data is never dropped.
//! Create is idempotent by `client_id`, a title clash maps to
//! `TodoError::Duplicate`, and lists are ordered by `id DESC`.

mod error;
mod postgres;
mod schema;
mod sqlite;

use todo_sync::domain::TodoConstraints;

pub use error::StoreError;
pub use postgres::PostgresTodoStore;
pub use sqlite::SqliteTodoStore;

/// Validation and uniqueness settings shared by both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub constraints: TodoConstraints,
    /// Enforce unique titles with a unique index.
    pub unique_titles: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            constraints: TodoConstraints::server(),
            unique_titles: true,
        }
    }
}

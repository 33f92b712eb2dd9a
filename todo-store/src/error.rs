use thiserror::Error;
use todo_sync::domain::TodoId;
use todo_sync::service::TodoError;

/// Errors raised while opening a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Failed to prepare schema: {0}")]
    Schema(#[source] sqlx::Error),
}

/// Maps a query failure to a service error.
pub(crate) fn database_error(error: &sqlx::Error) -> TodoError {
    tracing::error!(%error, "Database error");
    TodoError::Service(format!("Database error: {error}"))
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|database_error| database_error.is_unique_violation())
}

/// Returns true if `error` is a unique violation involving `column`.
pub(crate) fn is_unique_violation_on(error: &sqlx::Error, column: &str) -> bool {
    error.as_database_error().is_some_and(|database_error| {
        database_error.is_unique_violation()
            && (database_error
                .constraint()
                .is_some_and(|constraint| constraint.contains(column))
                || database_error.message().contains(column))
    })
}

/// Maps a write failure, turning a title clash into `Duplicate`.
pub(crate) fn write_error(error: &sqlx::Error, title: &str) -> TodoError {
    if is_unique_violation_on(error, "title") {
        TodoError::Duplicate {
            title: title.to_string(),
        }
    } else {
        database_error(error)
    }
}

pub(crate) fn corrupt_row(id: TodoId, detail: impl std::fmt::Display) -> TodoError {
    tracing::error!(%id, %detail, "Unreadable todo row");
    TodoError::Service(format!("Todo {id} could not be read: {detail}"))
}

//! CRUD service contract.
//!
//! The reconciliation engine talks to the service only through the
//! [`TodoService`] trait. Implementations live next to it (in-memory, HTTP,
//! fail injection) and in the `todo-store` crate (SQLite, PostgreSQL).

mod fail_injection;
#[cfg(feature = "http")]
mod http;
mod in_memory;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::{NewTodo, Todo, TodoId, TodoPatch, ValidationError};

pub use fail_injection::{
    FailInjectingService, FailInjectionConfig, FailInjectionConfigError, InjectionPhase,
};
#[cfg(feature = "http")]
pub use http::HttpTodoService;
pub use in_memory::InMemoryTodoService;

// =============================================================================
// Service Error
// =============================================================================

/// Errors returned by a CRUD service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TodoError {
    /// Input was rejected.
    #[error("{0}")]
    Validation(ValidationError),

    /// Another todo already has this title.
    #[error("A todo titled \"{title}\" already exists")]
    Duplicate { title: String },

    /// No todo with this id exists.
    #[error("Todo {0} not found")]
    NotFound(TodoId),

    /// Transport, timeout, or server failure.
    #[error("{0}")]
    Service(String),
}

/// Coarse error classification used for reconciliation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Service,
}

impl TodoError {
    /// Returns the coarse kind of this error. A duplicate title is a
    /// validation failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Duplicate { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Service(_) => ErrorKind::Service,
        }
    }

    /// Builds a service error from any displayable cause.
    #[must_use]
    pub fn service(cause: impl std::fmt::Display) -> Self {
        Self::Service(cause.to_string())
    }
}

impl From<ValidationError> for TodoError {
    fn from(error: ValidationError) -> Self {
        Self::Validation(error)
    }
}

// =============================================================================
// Service Trait
// =============================================================================

/// Boxed future returned by every service operation.
pub type ServiceFuture<'a, T> = BoxFuture<'a, Result<T, TodoError>>;

/// The CRUD service consumed by the reconciliation engine.
///
/// Every implementation validates input before writing and lists todos
/// newest first.
pub trait TodoService: Send + Sync {
    /// Returns all todos, newest first.
    fn list(&self) -> ServiceFuture<'_, Vec<Todo>>;

    /// Creates a todo. Creating twice with the same `clientId` returns the
    /// first record.
    fn create(&self, new_todo: NewTodo) -> ServiceFuture<'_, Todo>;

    /// Applies a partial update and returns the stored record.
    fn update(&self, id: TodoId, patch: TodoPatch) -> ServiceFuture<'_, Todo>;

    /// Deletes a todo.
    fn delete(&self, id: TodoId) -> ServiceFuture<'_, ()>;
}

impl<S: TodoService + ?Sized> TodoService for std::sync::Arc<S> {
    fn list(&self) -> ServiceFuture<'_, Vec<Todo>> {
        (**self).list()
    }

    fn create(&self, new_todo: NewTodo) -> ServiceFuture<'_, Todo> {
        (**self).create(new_todo)
    }

    fn update(&self, id: TodoId, patch: TodoPatch) -> ServiceFuture<'_, Todo> {
        (**self).update(id, patch)
    }

    fn delete(&self, id: TodoId) -> ServiceFuture<'_, ()> {
        (**self).delete(id)
    }
}

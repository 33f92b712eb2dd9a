//! # todo-sync
//!
//! Client-side cache and optimistic reconciliation for a todo CRUD service.
//!
//! ## Overview
//!
//! - **Domain**: `Todo` records, identifiers, and input constraints
//! - **Service**: the CRUD contract plus in-memory, HTTP and fail-injecting
//!   implementations
//! - **Cache**: ordered entries keyed by client id
//! - **Reconcile**: optimistic create / update / delete with rollback
//! - **Client**: async driver that runs mutations against a service
//!
//! ## Feature Flags
//!
//! - `http` (default): `HttpTodoService` backed by `reqwest`
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use todo_sync::prelude::*;
//!
//! # async fn example() {
//! let client = TodoClient::new(Arc::new(InMemoryTodoService::new()), ReconcilerConfig::default());
//! let outcome = client.create("Buy milk").await;
//! assert!(outcome.is_confirmed());
//! # }
//! ```

#![forbid(unsafe_code)]

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::cache::{EntryState, InsertPosition, TodoCache, TodoEntry};
    pub use crate::client::TodoClient;
    pub use crate::domain::{
        ClientId, FieldError, NewTodo, Timestamp, Todo, TodoConstraints, TodoId, TodoPatch,
        ValidationError,
    };
    pub use crate::reconcile::{
        Failure, Outcome, Reconciler, ReconcilerConfig, RefreshOutcome, Rejection, RollbackScope,
    };
    #[cfg(feature = "http")]
    pub use crate::service::HttpTodoService;
    pub use crate::service::{
        ErrorKind, FailInjectingService, FailInjectionConfig, InMemoryTodoService, TodoError,
        TodoService,
    };
}

pub mod cache;
pub mod client;
pub mod domain;
pub mod reconcile;
pub mod service;

//! Todo CRUD backend.
//!
//! Serves `/api/todos` over one of three backends chosen at startup
//! (see [`config`]). The router is exposed for embedding and tests.

pub mod api;
pub mod config;
pub mod storage;

pub use api::{AppState, create_router};
pub use config::{ConfigError, ServerConfig, StorageMode};
pub use storage::{SharedService, StorageError, StorageFactory};

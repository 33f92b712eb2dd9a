//! Route table.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | /api/todos | `list_todos` |
//! | POST | /api/todos | `create_todo` |
//! | PUT | /api/todos/{id} | `update_todo` |
//! | DELETE | /api/todos/{id} | `delete_todo` |
//! | GET | /health | `health_check` |

use axum::Router;
use axum::routing::{get, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, create_todo, delete_todo, health_check, list_todos, update_todo,
};

/// Builds the router with CORS open on every route and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/todos", get(list_todos).post(create_todo))
        .route("/api/todos/{id}", put(update_todo).delete(delete_todo))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

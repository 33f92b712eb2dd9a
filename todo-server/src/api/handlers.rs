//! Request handlers for the todo routes.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use todo_sync::domain::{NewTodo, Todo, TodoId, TodoPatch};

use super::error::ApiErrorResponse;
use crate::storage::SharedService;

// =============================================================================
// Application State
// =============================================================================

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: SharedService,
}

impl AppState {
    #[must_use]
    pub fn new(service: SharedService) -> Self {
        Self { service }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("service", &"Arc<dyn TodoService>")
            .finish()
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
#[allow(clippy::unused_async)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/todos, newest first.
///
/// # Errors
///
/// Returns `INTERNAL_ERROR` if the backend fails.
pub async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, ApiErrorResponse> {
    let todos = state.service.list().await?;
    Ok(Json(todos))
}

/// POST /api/todos
///
/// Repeating a request with the same `clientId` returns the stored record.
///
/// # Errors
///
/// - `VALIDATION_ERROR` for malformed JSON or an invalid title
/// - `DUPLICATE_TITLE` if the title is taken
pub async fn create_todo(
    State(state): State<AppState>,
    body: Result<Json<NewTodo>, JsonRejection>,
) -> Result<(StatusCode, Json<Todo>), ApiErrorResponse> {
    let Json(new_todo) = body?;
    let todo = state.service.create(new_todo).await?;
    tracing::debug!(id = %todo.id, "Todo created");
    Ok((StatusCode::CREATED, Json(todo)))
}

/// PUT /api/todos/{id}
///
/// # Errors
///
/// - `INVALID_ID` if `id` is not an integer
/// - `VALIDATION_ERROR` for malformed JSON, an empty patch or invalid fields
/// - `NOT_FOUND` if no todo has this id
/// - `DUPLICATE_TITLE` if the new title is taken
pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TodoPatch>, JsonRejection>,
) -> Result<Json<Todo>, ApiErrorResponse> {
    let id: TodoId = id.parse()?;
    let Json(patch) = body?;
    let todo = state.service.update(id, patch).await?;
    tracing::debug!(%id, "Todo updated");
    Ok(Json(todo))
}

/// DELETE /api/todos/{id}
///
/// # Errors
///
/// - `INVALID_ID` if `id` is not an integer
/// - `NOT_FOUND` if no todo has this id
pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiErrorResponse> {
    let id: TodoId = id.parse()?;
    state.service.delete(id).await?;
    tracing::debug!(%id, "Todo deleted");
    Ok(Json(MessageResponse {
        message: "Todo deleted successfully".to_string(),
    }))
}

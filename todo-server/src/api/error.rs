//! API error handling.
//!
//! Every failure is returned as `{"code", "message", "details"?}`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use todo_sync::domain::{FieldError, ParseTodoIdError};
use todo_sync::service::TodoError;

// =============================================================================
// API Error
// =============================================================================

/// API error structure for JSON responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Field-level errors for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            code: "VALIDATION_ERROR".to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// Status code plus error body.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiErrorResponse {
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// 400 for a path id that is not an integer.
    #[must_use]
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new("INVALID_ID", message))
    }

    /// 400 with field-level details.
    #[must_use]
    pub fn validation_error(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiError::validation(message, details),
        )
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", message))
    }

    #[must_use]
    pub fn duplicate_title(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ApiError::new("DUPLICATE_TITLE", message),
        )
    }

    #[must_use]
    pub fn internal_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("INTERNAL_ERROR", "An internal error occurred"),
        )
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<TodoError> for ApiErrorResponse {
    fn from(error: TodoError) -> Self {
        match error {
            TodoError::Validation(validation) => {
                Self::validation_error(validation.to_string(), validation.errors)
            }
            TodoError::Duplicate { .. } => Self::duplicate_title(error.to_string()),
            TodoError::NotFound(_) => Self::not_found(error.to_string()),
            // Internal details stay in the log.
            TodoError::Service(message) => {
                tracing::error!(%message, "Internal error");
                Self::internal_error()
            }
        }
    }
}

impl From<ParseTodoIdError> for ApiErrorResponse {
    fn from(error: ParseTodoIdError) -> Self {
        Self::invalid_id(error.to_string())
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        Self::validation_error(
            "Invalid request body",
            vec![FieldError::new("body", message)],
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

//! HTTP surface: routes, handlers and error responses.

pub mod error;
pub mod handlers;
pub mod routes;

pub use error::{ApiError, ApiErrorResponse};
pub use handlers::{AppState, HealthResponse, MessageResponse};
pub use routes::create_router;

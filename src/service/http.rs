//! HTTP client for the todo API.
//!
//! Status mapping: 400 → `Validation`, 404 → `NotFound`, 409 → `Duplicate`,
//! anything else that is not a success → `Service`. Transport errors and
//! timeouts are `Service` failures too.

use std::time::Duration;

use futures::FutureExt;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{ServiceFuture, TodoError, TodoService};
use crate::domain::{FieldError, NewTodo, Todo, TodoId, TodoPatch, ValidationError};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body returned by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Option<Vec<FieldError>>,
}

/// Todo service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTodoService {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTodoService {
    /// Creates a client for the API rooted at `base_url`
    /// (for example `http://localhost:8000`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn todos_url(&self) -> String {
        format!("{}/api/todos", self.base_url)
    }

    fn todo_url(&self, id: TodoId) -> String {
        format!("{}/api/todos/{id}", self.base_url)
    }
}

#[allow(clippy::cast_possible_truncation)] // Timeout in ms will not exceed u64
fn transport_error(error: &reqwest::Error, timeout: Duration) -> TodoError {
    if error.is_timeout() {
        TodoError::Service(format!(
            "Request timed out after {}ms",
            timeout.as_millis() as u64
        ))
    } else if error.is_connect() {
        TodoError::Service(format!("Connection failed: {error}"))
    } else {
        TodoError::Service(format!("Request failed: {error}"))
    }
}

/// Turns a non-success response into a `TodoError`.
async fn error_from_response(response: Response, id: Option<TodoId>, title: Option<String>) -> TodoError {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.ok();
    let message = body
        .as_ref()
        .map(|body| body.message.clone())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        StatusCode::BAD_REQUEST => {
            let errors = body
                .and_then(|body| body.details)
                .filter(|details| !details.is_empty())
                .unwrap_or_else(|| vec![FieldError::new("body", message)]);
            TodoError::Validation(ValidationError::new(errors))
        }
        StatusCode::NOT_FOUND => match id {
            Some(id) => TodoError::NotFound(id),
            None => TodoError::Service(message),
        },
        StatusCode::CONFLICT => TodoError::Duplicate {
            title: title.unwrap_or_default(),
        },
        _ => TodoError::Service(message),
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    id: Option<TodoId>,
    title: Option<String>,
) -> Result<T, TodoError> {
    if response.status().is_success() {
        response
            .json()
            .await
            .map_err(|error| TodoError::Service(format!("Invalid response body: {error}")))
    } else {
        Err(error_from_response(response, id, title).await)
    }
}

impl TodoService for HttpTodoService {
    fn list(&self) -> ServiceFuture<'_, Vec<Todo>> {
        async move {
            let response = self
                .client
                .get(self.todos_url())
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|error| transport_error(&error, self.timeout))?;
            decode(response, None, None).await
        }
        .boxed()
    }

    fn create(&self, new_todo: NewTodo) -> ServiceFuture<'_, Todo> {
        async move {
            let response = self
                .client
                .post(self.todos_url())
                .timeout(self.timeout)
                .json(&new_todo)
                .send()
                .await
                .map_err(|error| transport_error(&error, self.timeout))?;
            decode(response, None, Some(new_todo.title.trim().to_string())).await
        }
        .boxed()
    }

    fn update(&self, id: TodoId, patch: TodoPatch) -> ServiceFuture<'_, Todo> {
        async move {
            let response = self
                .client
                .put(self.todo_url(id))
                .timeout(self.timeout)
                .json(&patch)
                .send()
                .await
                .map_err(|error| transport_error(&error, self.timeout))?;
            let title = patch.title.map(|title| title.trim().to_string());
            decode(response, Some(id), title).await
        }
        .boxed()
    }

    fn delete(&self, id: TodoId) -> ServiceFuture<'_, ()> {
        async move {
            let response = self
                .client
                .delete(self.todo_url(id))
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|error| transport_error(&error, self.timeout))?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(error_from_response(response, Some(id), None).await)
            }
        }
        .boxed()
    }
}

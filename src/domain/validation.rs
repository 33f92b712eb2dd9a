//! Input constraints checked at each boundary.
//!
//! The client and the server share these checks but not their limits: the
//! client accepts titles up to 100 characters while the server column holds
//! 64, so a title can pass locally and still be rejected by the service.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::todo::{NewTodo, TodoPatch};

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Collection of field errors produced by one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Builds an error with a single field failure.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            return write!(formatter, "Validation failed");
        }
        let messages: Vec<&str> = self
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect();
        write!(formatter, "{}", messages.join("; "))
    }
}

// =============================================================================
// Constraints
// =============================================================================

/// Default client-side title limit.
pub const CLIENT_TITLE_MAX_CHARS: usize = 100;
/// Default server-side title limit.
pub const SERVER_TITLE_MAX_CHARS: usize = 64;
/// Default description limit on both sides.
pub const DESCRIPTION_MAX_CHARS: usize = 5000;

/// Length limits applied to todo input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TodoConstraints {
    pub title_max_chars: usize,
    pub description_max_chars: usize,
}

impl TodoConstraints {
    /// Limits used by the client forms.
    #[must_use]
    pub const fn client() -> Self {
        Self {
            title_max_chars: CLIENT_TITLE_MAX_CHARS,
            description_max_chars: DESCRIPTION_MAX_CHARS,
        }
    }

    /// Limits enforced by the service.
    #[must_use]
    pub const fn server() -> Self {
        Self {
            title_max_chars: SERVER_TITLE_MAX_CHARS,
            description_max_chars: DESCRIPTION_MAX_CHARS,
        }
    }

    #[must_use]
    pub const fn with_title_max_chars(mut self, title_max_chars: usize) -> Self {
        self.title_max_chars = title_max_chars;
        self
    }

    /// Validates and trims a title.
    ///
    /// # Errors
    ///
    /// Returns a field error if the trimmed title is empty or too long.
    pub fn validate_title(&self, title: &str) -> Result<String, FieldError> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(FieldError::new("title", "Title cannot be empty"));
        }
        if trimmed.chars().count() > self.title_max_chars {
            return Err(FieldError::new(
                "title",
                format!("Title must be at most {} characters", self.title_max_chars),
            ));
        }
        Ok(trimmed.to_string())
    }

    /// Validates and trims a description. An empty result means "cleared".
    ///
    /// # Errors
    ///
    /// Returns a field error if the description is too long.
    pub fn validate_description(&self, description: &str) -> Result<String, FieldError> {
        let trimmed = description.trim();
        if trimmed.chars().count() > self.description_max_chars {
            return Err(FieldError::new(
                "description",
                format!(
                    "Description must be at most {} characters",
                    self.description_max_chars
                ),
            ));
        }
        Ok(trimmed.to_string())
    }

    /// Validates a create request and returns its normalized form.
    ///
    /// # Errors
    ///
    /// Returns every field failure found.
    pub fn validate_new(&self, new_todo: &NewTodo) -> Result<NewTodo, ValidationError> {
        let title = self
            .validate_title(&new_todo.title)
            .map_err(|error| ValidationError::new(vec![error]))?;
        Ok(NewTodo {
            title,
            client_id: new_todo.client_id,
            due_date: new_todo.due_date,
        })
    }

    /// Validates a patch and returns its normalized form.
    ///
    /// # Errors
    ///
    /// Returns every field failure found, or a single error for an empty patch.
    pub fn validate_patch(&self, patch: &TodoPatch) -> Result<TodoPatch, ValidationError> {
        if patch.is_empty() {
            return Err(ValidationError::single(
                "body",
                "At least one field must be provided",
            ));
        }

        let mut errors = Vec::new();
        let title = match patch.title.as_deref().map(|title| self.validate_title(title)) {
            Some(Ok(title)) => Some(title),
            Some(Err(error)) => {
                errors.push(error);
                None
            }
            None => None,
        };
        let description = match patch
            .description
            .as_deref()
            .map(|description| self.validate_description(description))
        {
            Some(Ok(description)) => Some(description),
            Some(Err(error)) => {
                errors.push(error);
                None
            }
            None => None,
        };

        if !errors.is_empty() {
            return Err(ValidationError::new(errors));
        }
        Ok(TodoPatch {
            title,
            completed: patch.completed,
            description,
            due_date: patch.due_date,
        })
    }
}

impl Default for TodoConstraints {
    fn default() -> Self {
        Self::client()
    }
}

// =============================================================================
// Due dates
// =============================================================================

/// Parses a `YYYY-MM-DD` due date.
///
/// # Errors
///
/// Returns a field error if the shape is wrong or the date does not exist.
pub fn parse_due_date(input: &str) -> Result<NaiveDate, FieldError> {
    let invalid = || FieldError::new("dueDate", "Due date must be a valid date (YYYY-MM-DD)");
    let bytes = input.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !well_formed {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| invalid())
}

/// Reformats free typing into `YYYY-MM-DD` shape.
///
/// Keeps at most eight digits and inserts dashes after the year and month.
#[must_use]
pub fn normalize_due_date_input(input: &str) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).take(8).collect();
    match digits.len() {
        0..=4 => digits,
        5..=6 => format!("{}-{}", &digits[..4], &digits[4..]),
        _ => format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..]),
    }
}

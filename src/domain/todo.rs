//! Todo domain model.
//!
//! This module contains the records exchanged with the CRUD service:
//! identifiers, the server-side `Todo` record, and the request shapes for
//! creating and patching todos. All wire names are camelCase.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Server-assigned identifier of a todo.
///
/// Stable once assigned. The cache never invents one: a pending entry has
/// no `TodoId` at all, so it cannot be sent to the service by mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(i64);

impl TodoId {
    /// Creates a `TodoId` from its raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Error returned when a path segment is not a positive integer id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid ID: '{0}'")]
pub struct ParseTodoIdError(pub String);

impl FromStr for TodoId {
    type Err = ParseTodoIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(Self)
            .ok_or_else(|| ParseTodoIdError(value.to_string()))
    }
}

/// Namespace used to derive client ids for records that arrive without one.
const DERIVED_CLIENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_52d6_2a0e_4b0c_9a55_2d1f_3c7b_8e41);

/// Client-assigned identifier of a todo.
///
/// Generated when the user submits a new todo and kept for the whole
/// session. It is the reconciliation key for creates, because the server id
/// is unknown until the service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Creates a `ClientId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a fresh random `ClientId` (UUID v4).
    ///
    /// **Note**: impure (random number generation). The reconciler never
    /// calls this; ids are generated by the driver and passed in.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a stable `ClientId` for a server record that carries none.
    ///
    /// The same `TodoId` always yields the same key (UUID v5), so a refresh
    /// never re-keys an entry.
    #[must_use]
    pub fn derived_from(id: TodoId) -> Self {
        Self(Uuid::new_v5(
            &DERIVED_CLIENT_ID_NAMESPACE,
            &id.get().to_be_bytes(),
        ))
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// A timestamp wrapper for `DateTime<Utc>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the inner `DateTime<Utc>`.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time.
    ///
    /// **Note**: impure (system clock).
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// =============================================================================
// Records
// =============================================================================

/// A todo as stored by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Server-assigned id.
    pub id: TodoId,
    /// Client key supplied at creation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// Non-empty title.
    pub title: String,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
    /// Creation time, set once by the store.
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl Todo {
    /// Applies an already validated patch in place.
    ///
    /// An empty description clears it; `due_date: Some(None)` clears the date.
    pub fn apply(&mut self, patch: &TodoPatch) {
        patch.write_to(PatchFields {
            title: &mut self.title,
            completed: &mut self.completed,
            description: &mut self.description,
            due_date: &mut self.due_date,
        });
    }
}

/// Input for the create operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    /// Title as typed by the user.
    pub title: String,
    /// Reconciliation key; creating twice with the same key is idempotent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl NewTodo {
    /// Creates a request with only a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            client_id: None,
            due_date: None,
        }
    }

    /// Sets the client key.
    #[must_use]
    pub const fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Sets the due date.
    #[must_use]
    pub const fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// Partial update of a todo.
///
/// Absent fields are left untouched. `description: Some("")` clears the
/// description and `due_date: Some(None)` (JSON `null`) clears the date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub due_date: Option<Option<NaiveDate>>,
}

/// Mutable views of the patchable fields of a todo record.
pub(crate) struct PatchFields<'a> {
    pub title: &'a mut String,
    pub completed: &'a mut bool,
    pub description: &'a mut Option<String>,
    pub due_date: &'a mut Option<NaiveDate>,
}

impl TodoPatch {
    /// Writes the present fields. An empty description clears it.
    pub(crate) fn write_to(&self, fields: PatchFields<'_>) {
        if let Some(title) = &self.title {
            fields.title.clone_from(title);
        }
        if let Some(completed) = self.completed {
            *fields.completed = completed;
        }
        if let Some(description) = &self.description {
            *fields.description = Some(description.clone()).filter(|text| !text.is_empty());
        }
        if let Some(due_date) = self.due_date {
            *fields.due_date = due_date;
        }
    }

    /// Patch that only sets the completion flag.
    #[must_use]
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    /// Patch that only renames the todo.
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Adds a title change.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Adds a completion change.
    #[must_use]
    pub const fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Adds a description change; an empty string clears it.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a due date change; `None` clears it.
    #[must_use]
    pub const fn with_due_date(mut self, due_date: Option<NaiveDate>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
    }
}

/// Distinguishes an explicit `null` from a missing field.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample_todo() -> Todo {
        Todo {
            id: TodoId::new(7),
            client_id: None,
            title: "Buy milk".to_string(),
            completed: false,
            created_at: Timestamp::now(),
            description: None,
            due_date: None,
        }
    }

    #[rstest]
    #[case("42", Some(42))]
    #[case(" 7 ", Some(7))]
    #[case("abc", None)]
    #[case("", None)]
    #[case("1.5", None)]
    #[case("0", None)]
    #[case("-3", None)]
    fn todo_id_parses_positive_integers_only(#[case] input: &str, #[case] expected: Option<i64>) {
        let parsed = input.parse::<TodoId>().ok().map(TodoId::get);
        assert_eq!(parsed, expected);
    }

    #[rstest]
    fn derived_client_id_is_stable_per_todo_id() {
        let first = ClientId::derived_from(TodoId::new(3));
        let second = ClientId::derived_from(TodoId::new(3));
        let other = ClientId::derived_from(TodoId::new(4));

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[rstest]
    fn generated_client_ids_are_distinct() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }

    #[rstest]
    fn todo_serializes_camel_case_and_skips_absent_fields() {
        let json = serde_json::to_value(sample_todo()).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["title"], "Buy milk");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("clientId").is_none());
        assert!(json.get("dueDate").is_none());
    }

    #[rstest]
    fn patch_distinguishes_null_from_missing_due_date() {
        let cleared: TodoPatch = serde_json::from_str(r#"{"dueDate":null}"#).unwrap();
        let missing: TodoPatch = serde_json::from_str(r#"{"completed":true}"#).unwrap();
        let set: TodoPatch = serde_json::from_str(r#"{"dueDate":"2024-03-01"}"#).unwrap();

        assert_eq!(cleared.due_date, Some(None));
        assert_eq!(missing.due_date, None);
        assert_eq!(
            set.due_date,
            Some(Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
        );
    }

    #[rstest]
    fn patch_serializes_cleared_due_date_as_null() {
        let patch = TodoPatch::default().with_due_date(None);
        let json = serde_json::to_string(&patch).unwrap();

        assert_eq!(json, r#"{"dueDate":null}"#);
    }

    #[rstest]
    fn apply_updates_only_present_fields() {
        let mut todo = sample_todo();
        todo.description = Some("old".to_string());

        todo.apply(&TodoPatch::completed(true));

        assert!(todo.completed);
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.description.as_deref(), Some("old"));
    }

    #[rstest]
    fn apply_clears_description_and_due_date() {
        let mut todo = sample_todo();
        todo.description = Some("old".to_string());
        todo.due_date = NaiveDate::from_ymd_opt(2024, 1, 1);

        todo.apply(&TodoPatch::default().with_description("").with_due_date(None));

        assert_eq!(todo.description, None);
        assert_eq!(todo.due_date, None);
    }

    #[rstest]
    fn empty_patch_is_empty() {
        assert!(TodoPatch::default().is_empty());
        assert!(!TodoPatch::title("x").is_empty());
    }
}

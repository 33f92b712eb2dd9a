//! Optimistic reconciliation engine.
//!
//! [`Reconciler`] owns the [`TodoCache`] and is the only thing that mutates
//! it. Every mutation is split in two steps:
//!
//! 1. `begin_*` applies the change to the cache immediately and returns a
//!    ticket describing the request to send, or a [`Rejection`] when nothing
//!    was applied.
//! 2. `settle_*` consumes the ticket together with the service's answer and
//!    either confirms the change or rolls it back, returning an [`Outcome`].
//!
//! The engine is synchronous and free of I/O: client ids and timestamps are
//! passed in, and the caller performs the service call between the two
//! steps. Any number of tickets may be outstanding at once; answers are
//! applied to whatever the cache holds when they arrive.
//!
//! # Reconciliation keys
//!
//! Creates are matched by [`ClientId`], updates and deletes by [`TodoId`].
//! Titles and positions are never used as keys.
//!
//! # Refresh
//!
//! Refreshes are last-fetch-wins. Starting or settling any mutation, or
//! starting a newer refresh, makes outstanding fetch tickets stale, and a
//! stale list is discarded on arrival.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::cache::{EntryState, InsertPosition, TodoCache, TodoEntry};
use crate::domain::{
    ClientId, NewTodo, Timestamp, Todo, TodoConstraints, TodoId, TodoPatch, ValidationError,
};
use crate::domain::todo::PatchFields;
use crate::service::{ErrorKind, TodoError};

// =============================================================================
// Configuration
// =============================================================================

/// How much state a failed mutation restores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RollbackScope {
    /// Undo only what the failed mutation changed.
    #[default]
    Entry,
    /// Restore the whole cache as it was before the mutation began.
    Cache,
}

/// Reconciler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub rollback: RollbackScope,
    /// Where optimistic creates are inserted.
    pub insert: InsertPosition,
    pub constraints: TodoConstraints,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            rollback: RollbackScope::Entry,
            insert: InsertPosition::Head,
            constraints: TodoConstraints::client(),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Why a `begin_*` call applied nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("{0}")]
    Invalid(ValidationError),

    /// No confirmed entry has this id.
    #[error("Todo {0} is not in the list")]
    NotInCache(TodoId),

    #[error("Client id {0} is already in use")]
    ClientIdInUse(ClientId),
}

/// A mutation that was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub error: TodoError,
    /// User-visible message naming the affected todo.
    pub message: String,
    /// The cache is known to be out of date and should be refreshed.
    pub refresh_required: bool,
}

impl Failure {
    fn new(action: &str, title: &str, error: TodoError) -> Self {
        let message = format!("Failed to {action} todo \"{title}\": {error}");
        let refresh_required = error.kind() == ErrorKind::NotFound;
        Self {
            error,
            message,
            refresh_required,
        }
    }
}

/// Final state of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The service accepted the change. Carries the entry as now cached
    /// (for deletes, the removed entry).
    Confirmed(TodoEntry),
    /// The service refused or failed; the optimistic change was undone.
    Reverted(Failure),
    /// Nothing was applied or sent.
    Rejected(Rejection),
}

impl Outcome {
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// Returns the message to show the user, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Confirmed(_) => None,
            Self::Reverted(failure) => Some(failure.message.clone()),
            Self::Rejected(rejection) => Some(rejection.to_string()),
        }
    }

    #[must_use]
    pub const fn refresh_required(&self) -> bool {
        matches!(self, Self::Reverted(failure) if failure.refresh_required)
    }
}

/// Result of settling a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The list replaced the cache contents.
    Applied { count: usize },
    /// A newer fetch or a mutation superseded this one; nothing changed.
    Stale,
    /// The fetch failed; nothing changed.
    Failed(TodoError),
}

// =============================================================================
// Tickets
// =============================================================================

/// An in-flight create.
#[derive(Debug)]
#[must_use = "a ticket must be settled"]
pub struct CreateTicket {
    request: NewTodo,
    client_id: ClientId,
    snapshot: Option<TodoCache>,
}

impl CreateTicket {
    /// The request to send to the service.
    pub const fn request(&self) -> &NewTodo {
        &self.request
    }

    pub const fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn title(&self) -> &str {
        &self.request.title
    }
}

/// Values of the fields a patch touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PatchedFields {
    title: Option<String>,
    completed: Option<bool>,
    description: Option<Option<String>>,
    due_date: Option<Option<NaiveDate>>,
}

impl PatchedFields {
    fn capture(entry: &TodoEntry, patch: &TodoPatch) -> Self {
        Self {
            title: patch.title.as_ref().map(|_| entry.title.clone()),
            completed: patch.completed.map(|_| entry.completed),
            description: patch.description.as_ref().map(|_| entry.description.clone()),
            due_date: patch.due_date.map(|_| entry.due_date),
        }
    }
}

/// An in-flight update.
#[derive(Debug)]
#[must_use = "a ticket must be settled"]
pub struct UpdateTicket {
    id: TodoId,
    patch: TodoPatch,
    title_before: String,
    before: PatchedFields,
    written: PatchedFields,
    snapshot: Option<TodoCache>,
}

impl UpdateTicket {
    pub const fn id(&self) -> TodoId {
        self.id
    }

    /// The validated patch to send to the service.
    pub const fn patch(&self) -> &TodoPatch {
        &self.patch
    }

    /// The title the entry had before this update.
    pub fn title(&self) -> &str {
        &self.title_before
    }
}

/// An in-flight delete.
#[derive(Debug)]
#[must_use = "a ticket must be settled"]
pub struct DeleteTicket {
    id: TodoId,
    entry: TodoEntry,
    index: usize,
    predecessor: Option<ClientId>,
    snapshot: Option<TodoCache>,
}

impl DeleteTicket {
    pub const fn id(&self) -> TodoId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.entry.title
    }
}

/// An in-flight list fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a ticket must be settled"]
pub struct FetchTicket {
    generation: u64,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Owns the cache and applies optimistic mutations and their answers.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    cache: TodoCache,
    config: ReconcilerConfig,
    fetch_generation: u64,
    /// Number of outstanding updates per id.
    in_flight_updates: HashMap<TodoId, usize>,
    /// Entries removed by a delete that is still in flight. Updates settling
    /// meanwhile are applied here so a failed delete restores current fields.
    in_flight_deletes: HashMap<TodoId, TodoEntry>,
}

impl Reconciler {
    #[must_use]
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Creates a reconciler whose cache is seeded with server records.
    #[must_use]
    pub fn with_todos(config: ReconcilerConfig, todos: Vec<Todo>) -> Self {
        Self {
            cache: TodoCache::from_server(todos),
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &TodoCache {
        &self.cache
    }

    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Returns true while any mutation is awaiting an answer.
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight_updates.is_empty()
            || !self.in_flight_deletes.is_empty()
            || self.cache.iter().any(TodoEntry::is_pending)
    }

    fn snapshot(&self) -> Option<TodoCache> {
        match self.config.rollback {
            RollbackScope::Entry => None,
            RollbackScope::Cache => Some(self.cache.clone()),
        }
    }

    /// The live entry for `id`, or its tombstone while a delete is in flight.
    fn entry_mut(&mut self, id: TodoId) -> Option<&mut TodoEntry> {
        self.cache
            .get_mut_by_id(id)
            .or_else(|| self.in_flight_deletes.get_mut(&id))
    }

    const fn invalidate_fetches(&mut self) {
        self.fetch_generation += 1;
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Inserts a pending entry for a new todo.
    ///
    /// # Errors
    ///
    /// Rejects an invalid title or a client id that is already cached.
    pub fn begin_create(
        &mut self,
        client_id: ClientId,
        title: &str,
        due_date: Option<NaiveDate>,
        created_at: Timestamp,
    ) -> Result<CreateTicket, Rejection> {
        let title = self
            .config
            .constraints
            .validate_title(title)
            .map_err(|error| Rejection::Invalid(ValidationError::new(vec![error])))?;
        if self.cache.contains(client_id) {
            return Err(Rejection::ClientIdInUse(client_id));
        }

        let snapshot = self.snapshot();
        let entry = TodoEntry::pending(client_id, title.clone(), due_date, created_at);
        self.cache
            .insert(entry, self.config.insert)
            .map_err(|error| Rejection::ClientIdInUse(error.0))?;
        self.invalidate_fetches();

        let mut request = NewTodo::new(title).with_client_id(client_id);
        request.due_date = due_date;
        Ok(CreateTicket {
            request,
            client_id,
            snapshot,
        })
    }

    /// Applies the service's answer to a create.
    pub fn settle_create(&mut self, ticket: CreateTicket, result: Result<Todo, TodoError>) -> Outcome {
        self.invalidate_fetches();
        match result {
            Ok(todo) => {
                let client_id = ticket.client_id;
                let id = todo.id;
                self.cache
                    .retain(|entry| entry.client_id == client_id || entry.id() != Some(id));

                let entry = TodoEntry::confirmed(client_id, todo);
                if self.cache.replace(entry.clone()).is_none() {
                    let _ = self.cache.insert(entry.clone(), self.config.insert);
                }
                Outcome::Confirmed(entry)
            }
            Err(error) => {
                match ticket.snapshot {
                    Some(snapshot) => self.cache = snapshot,
                    None => {
                        self.cache.remove(ticket.client_id);
                    }
                }
                Outcome::Reverted(Failure::new("create", &ticket.request.title, error))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Applies a patch to a confirmed entry.
    ///
    /// # Errors
    ///
    /// Rejects an invalid patch or an id with no confirmed entry.
    pub fn begin_update(&mut self, id: TodoId, patch: &TodoPatch) -> Result<UpdateTicket, Rejection> {
        let patch = self
            .config
            .constraints
            .validate_patch(patch)
            .map_err(Rejection::Invalid)?;
        let snapshot = self.snapshot();
        let entry = self
            .cache
            .get_mut_by_id(id)
            .ok_or(Rejection::NotInCache(id))?;

        let title_before = entry.title.clone();
        let before = PatchedFields::capture(entry, &patch);
        apply_patch(entry, &patch);
        let written = PatchedFields::capture(entry, &patch);

        *self.in_flight_updates.entry(id).or_insert(0) += 1;
        self.invalidate_fetches();

        Ok(UpdateTicket {
            id,
            patch,
            title_before,
            before,
            written,
            snapshot,
        })
    }

    /// Flips the completion flag of a confirmed entry.
    ///
    /// # Errors
    ///
    /// Rejects an id with no confirmed entry.
    pub fn begin_toggle(&mut self, id: TodoId) -> Result<UpdateTicket, Rejection> {
        let completed = self
            .cache
            .get_by_id(id)
            .map(|entry| entry.completed)
            .ok_or(Rejection::NotInCache(id))?;
        self.begin_update(id, &TodoPatch::completed(!completed))
    }

    /// Applies the service's answer to an update.
    pub fn settle_update(&mut self, ticket: UpdateTicket, result: Result<Todo, TodoError>) -> Outcome {
        self.invalidate_fetches();
        self.finish_update(ticket.id);

        match result {
            Ok(todo) => {
                let entry = match self.entry_mut(ticket.id) {
                    Some(entry) => {
                        merge_server(entry, todo);
                        entry.clone()
                    }
                    None => TodoEntry::from_server(todo),
                };
                Outcome::Confirmed(entry)
            }
            Err(error) => {
                match ticket.snapshot {
                    Some(snapshot) => self.cache = snapshot,
                    None => {
                        if let Some(entry) = self.entry_mut(ticket.id) {
                            revert_fields(entry, &ticket.before, &ticket.written);
                        }
                    }
                }
                Outcome::Reverted(Failure::new("update", &ticket.title_before, error))
            }
        }
    }

    fn finish_update(&mut self, id: TodoId) {
        if let Some(count) = self.in_flight_updates.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.in_flight_updates.remove(&id);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Removes a confirmed entry.
    ///
    /// # Errors
    ///
    /// Rejects an id with no confirmed entry.
    pub fn begin_delete(&mut self, id: TodoId) -> Result<DeleteTicket, Rejection> {
        let snapshot = self.snapshot();
        let (index, entry) = self
            .cache
            .remove_by_id(id)
            .ok_or(Rejection::NotInCache(id))?;
        let predecessor = index
            .checked_sub(1)
            .and_then(|before| self.cache.entries().get(before))
            .map(|entry| entry.client_id);

        self.in_flight_deletes.insert(id, entry.clone());
        self.invalidate_fetches();

        Ok(DeleteTicket {
            id,
            entry,
            index,
            predecessor,
            snapshot,
        })
    }

    /// Applies the service's answer to a delete.
    pub fn settle_delete(&mut self, ticket: DeleteTicket, result: Result<(), TodoError>) -> Outcome {
        self.invalidate_fetches();
        let entry = self
            .in_flight_deletes
            .remove(&ticket.id)
            .unwrap_or(ticket.entry);

        match result {
            Ok(()) => Outcome::Confirmed(entry),
            Err(error) => {
                let failure = Failure::new("delete", &entry.title, error);
                match ticket.snapshot {
                    Some(snapshot) => self.cache = snapshot,
                    None => self.restore_deleted(entry, ticket.index, ticket.predecessor),
                }
                Outcome::Reverted(failure)
            }
        }
    }

    fn restore_deleted(&mut self, entry: TodoEntry, index: usize, predecessor: Option<ClientId>) {
        let position = match predecessor {
            None => 0,
            Some(client_id) => self
                .cache
                .position(client_id)
                .map_or(index, |position| position + 1),
        };
        // A refresh may have brought the record back already.
        let _ = self.cache.insert_at(position, entry);
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Starts a list fetch, superseding any outstanding one.
    pub const fn begin_refresh(&mut self) -> FetchTicket {
        self.invalidate_fetches();
        FetchTicket {
            generation: self.fetch_generation,
        }
    }

    /// Returns true if the ticket would still be applied.
    #[must_use]
    pub const fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.generation == self.fetch_generation
    }

    /// Applies a fetched list if the ticket is still current.
    pub fn settle_refresh(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Todo>, TodoError>,
    ) -> RefreshOutcome {
        if !self.is_current(ticket) {
            return RefreshOutcome::Stale;
        }
        match result {
            Ok(todos) => {
                self.apply_list(todos);
                RefreshOutcome::Applied {
                    count: self.cache.len(),
                }
            }
            Err(error) => RefreshOutcome::Failed(error),
        }
    }

    fn apply_list(&mut self, todos: Vec<Todo>) {
        let mut previous = std::mem::take(&mut self.cache);
        let mut next = TodoCache::new();

        for todo in todos {
            if self.in_flight_deletes.contains_key(&todo.id) {
                continue;
            }
            let existing = previous
                .remove_by_id(todo.id)
                .or_else(|| todo.client_id.and_then(|client_id| previous.remove(client_id)))
                .map(|(_, entry)| entry);

            let entry = match existing {
                Some(mut entry) if self.in_flight_updates.contains_key(&todo.id) => {
                    entry.state = EntryState::Confirmed(todo.id);
                    entry
                }
                Some(entry) => TodoEntry::confirmed(entry.client_id, todo),
                None => TodoEntry::from_server(todo),
            };
            let _ = next.insert(entry, InsertPosition::Tail);
        }

        let pending: Vec<TodoEntry> = previous
            .iter()
            .filter(|entry| entry.is_pending())
            .cloned()
            .collect();
        match self.config.insert {
            InsertPosition::Head => {
                for entry in pending.into_iter().rev() {
                    let _ = next.insert(entry, InsertPosition::Head);
                }
            }
            InsertPosition::Tail => {
                for entry in pending {
                    let _ = next.insert(entry, InsertPosition::Tail);
                }
            }
        }

        self.cache = next;
    }
}

// =============================================================================
// Field helpers
// =============================================================================

fn apply_patch(entry: &mut TodoEntry, patch: &TodoPatch) {
    patch.write_to(PatchFields {
        title: &mut entry.title,
        completed: &mut entry.completed,
        description: &mut entry.description,
        due_date: &mut entry.due_date,
    });
}

/// Restores each patched field that still holds the value this update wrote.
fn revert_fields(entry: &mut TodoEntry, before: &PatchedFields, written: &PatchedFields) {
    if let (Some(old), Some(new)) = (&before.title, &written.title)
        && entry.title == *new
    {
        entry.title.clone_from(old);
    }
    if let (Some(old), Some(new)) = (before.completed, written.completed)
        && entry.completed == new
    {
        entry.completed = old;
    }
    if let (Some(old), Some(new)) = (&before.description, &written.description)
        && entry.description == *new
    {
        entry.description.clone_from(old);
    }
    if let (Some(old), Some(new)) = (before.due_date, written.due_date)
        && entry.due_date == new
    {
        entry.due_date = old;
    }
}

/// Overwrites an entry with the server's record, keeping its client id.
fn merge_server(entry: &mut TodoEntry, todo: Todo) {
    let client_id = entry.client_id;
    *entry = TodoEntry::confirmed(client_id, todo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn todo(id: i64, title: &str) -> Todo {
        Todo {
            id: TodoId::new(id),
            client_id: None,
            title: title.to_string(),
            completed: false,
            created_at: Timestamp::now(),
            description: None,
            due_date: None,
        }
    }

    fn titles(reconciler: &Reconciler) -> Vec<String> {
        reconciler
            .cache()
            .iter()
            .map(|entry| entry.title.clone())
            .collect()
    }

    fn server_error() -> TodoError {
        TodoError::service("Internal server error")
    }

    #[fixture]
    fn seeded() -> Reconciler {
        Reconciler::with_todos(
            ReconcilerConfig::default(),
            vec![todo(3, "c"), todo(2, "b"), todo(1, "a")],
        )
    }

    #[fixture]
    fn seeded_cache_scope() -> Reconciler {
        Reconciler::with_todos(
            ReconcilerConfig {
                rollback: RollbackScope::Cache,
                ..ReconcilerConfig::default()
            },
            vec![todo(3, "c"), todo(2, "b"), todo(1, "a")],
        )
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    #[rstest]
    fn create_inserts_pending_entry_at_head(mut seeded: Reconciler) {
        let client_id = ClientId::generate();
        let ticket = seeded
            .begin_create(client_id, "  new  ", None, Timestamp::now())
            .unwrap();

        assert_eq!(ticket.request().title, "new");
        assert_eq!(ticket.request().client_id, Some(client_id));
        let head = &seeded.cache().entries()[0];
        assert_eq!(head.client_id, client_id);
        assert_eq!(head.state, EntryState::Pending);
        assert!(!head.completed);
    }

    #[rstest]
    fn create_inserts_at_tail_when_configured() {
        let mut reconciler = Reconciler::with_todos(
            ReconcilerConfig {
                insert: InsertPosition::Tail,
                ..ReconcilerConfig::default()
            },
            vec![todo(1, "a")],
        );

        let _ticket = reconciler
            .begin_create(ClientId::generate(), "new", None, Timestamp::now())
            .unwrap();

        assert_eq!(titles(&reconciler), vec!["a", "new"]);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn create_rejects_blank_title(mut seeded: Reconciler, #[case] title: &str) {
        let result = seeded.begin_create(ClientId::generate(), title, None, Timestamp::now());

        assert!(matches!(result, Err(Rejection::Invalid(_))));
        assert_eq!(seeded.cache().len(), 3);
    }

    #[rstest]
    fn create_rejects_title_over_client_limit(mut seeded: Reconciler) {
        let result = seeded.begin_create(
            ClientId::generate(),
            &"x".repeat(101),
            None,
            Timestamp::now(),
        );
        assert!(matches!(result, Err(Rejection::Invalid(_))));
    }

    #[rstest]
    fn create_success_replaces_pending_in_place(mut seeded: Reconciler) {
        let client_id = ClientId::generate();
        let ticket = seeded
            .begin_create(client_id, "new", None, Timestamp::now())
            .unwrap();
        let mut record = todo(4, "new");
        record.client_id = Some(client_id);

        let outcome = seeded.settle_create(ticket, Ok(record));

        assert!(outcome.is_confirmed());
        assert_eq!(titles(&seeded), vec!["new", "c", "b", "a"]);
        let head = &seeded.cache().entries()[0];
        assert_eq!(head.client_id, client_id);
        assert_eq!(head.id(), Some(TodoId::new(4)));
    }

    #[rstest]
    fn create_success_keeps_client_id_when_server_omits_it(mut seeded: Reconciler) {
        let client_id = ClientId::generate();
        let ticket = seeded
            .begin_create(client_id, "new", None, Timestamp::now())
            .unwrap();

        seeded.settle_create(ticket, Ok(todo(4, "new")));

        assert_eq!(seeded.cache().get_by_id(TodoId::new(4)).unwrap().client_id, client_id);
    }

    #[rstest]
    fn create_success_drops_other_entry_with_same_id(mut seeded: Reconciler) {
        let client_id = ClientId::generate();
        let ticket = seeded
            .begin_create(client_id, "new", None, Timestamp::now())
            .unwrap();
        // A refresh raced ahead and brought the record under a derived key.
        let refresh = seeded.begin_refresh();
        seeded.settle_refresh(refresh, Ok(vec![todo(4, "new"), todo(3, "c"), todo(2, "b"), todo(1, "a")]));

        seeded.settle_create(ticket, Ok(todo(4, "new")));

        let matching = seeded
            .cache()
            .iter()
            .filter(|entry| entry.id() == Some(TodoId::new(4)))
            .count();
        assert_eq!(matching, 1);
        assert_eq!(seeded.cache().get_by_id(TodoId::new(4)).unwrap().client_id, client_id);
    }

    #[rstest]
    fn create_success_reinserts_vanished_pending_entry(mut seeded_cache_scope: Reconciler) {
        let reconciler = &mut seeded_cache_scope;
        let delete = reconciler.begin_delete(TodoId::new(1)).unwrap();
        let client_id = ClientId::generate();
        let create = reconciler
            .begin_create(client_id, "new", None, Timestamp::now())
            .unwrap();
        // Whole-cache rollback of the delete drops the pending create.
        reconciler.settle_delete(delete, Err(server_error()));
        assert!(!reconciler.cache().contains(client_id));

        reconciler.settle_create(create, Ok(todo(4, "new")));

        assert!(reconciler.cache().contains(client_id));
        assert_eq!(reconciler.cache().len(), 4);
    }

    #[rstest]
    fn create_failure_removes_pending_entry_and_names_title(mut seeded: Reconciler) {
        let client_id = ClientId::generate();
        let ticket = seeded
            .begin_create(client_id, "doomed", None, Timestamp::now())
            .unwrap();

        let outcome = seeded.settle_create(ticket, Err(server_error()));

        assert!(!seeded.cache().contains(client_id));
        assert_eq!(titles(&seeded), vec!["c", "b", "a"]);
        assert_eq!(
            outcome.message().unwrap(),
            "Failed to create todo \"doomed\": Internal server error"
        );
        assert!(!outcome.refresh_required());
    }

    #[rstest]
    fn equal_titles_with_distinct_client_ids_never_merge(mut seeded: Reconciler) {
        let first_id = ClientId::generate();
        let second_id = ClientId::generate();
        let first = seeded
            .begin_create(first_id, "same", None, Timestamp::now())
            .unwrap();
        let second = seeded
            .begin_create(second_id, "same", None, Timestamp::now())
            .unwrap();

        let mut second_record = todo(5, "same");
        second_record.client_id = Some(second_id);
        let mut first_record = todo(4, "same");
        first_record.client_id = Some(first_id);
        seeded.settle_create(second, Ok(second_record));
        seeded.settle_create(first, Ok(first_record));

        assert_eq!(seeded.cache().len(), 5);
        assert_eq!(seeded.cache().get(first_id).unwrap().id(), Some(TodoId::new(4)));
        assert_eq!(seeded.cache().get(second_id).unwrap().id(), Some(TodoId::new(5)));
    }

    #[rstest]
    fn create_rejects_reused_client_id(mut seeded: Reconciler) {
        let client_id = ClientId::generate();
        let _ticket = seeded
            .begin_create(client_id, "one", None, Timestamp::now())
            .unwrap();

        let result = seeded.begin_create(client_id, "two", None, Timestamp::now());

        assert_eq!(result.unwrap_err(), Rejection::ClientIdInUse(client_id));
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    #[rstest]
    fn toggle_is_visible_immediately_and_reverted_on_failure(mut seeded: Reconciler) {
        let ticket = seeded.begin_toggle(TodoId::new(2)).unwrap();
        assert!(seeded.cache().get_by_id(TodoId::new(2)).unwrap().completed);

        let outcome = seeded.settle_update(ticket, Err(server_error()));

        assert!(!seeded.cache().get_by_id(TodoId::new(2)).unwrap().completed);
        assert_eq!(
            outcome.message().unwrap(),
            "Failed to update todo \"b\": Internal server error"
        );
    }

    #[rstest]
    fn update_success_merges_server_record(mut seeded: Reconciler) {
        let ticket = seeded
            .begin_update(TodoId::new(2), &TodoPatch::title("renamed"))
            .unwrap();
        let mut record = todo(2, "renamed");
        record.description = Some("set by server".to_string());

        let outcome = seeded.settle_update(ticket, Ok(record));

        let entry = seeded.cache().get_by_id(TodoId::new(2)).unwrap();
        assert_eq!(entry.description.as_deref(), Some("set by server"));
        assert_eq!(titles(&seeded), vec!["c", "renamed", "a"]);
        assert!(outcome.is_confirmed());
    }

    #[rstest]
    fn update_failure_message_uses_title_before_update(mut seeded: Reconciler) {
        let ticket = seeded
            .begin_update(TodoId::new(2), &TodoPatch::title("renamed"))
            .unwrap();

        let outcome = seeded.settle_update(ticket, Err(server_error()));

        assert!(outcome.message().unwrap().contains("\"b\""));
        assert_eq!(titles(&seeded), vec!["c", "b", "a"]);
    }

    #[rstest]
    fn optimistic_update_matches_server_apply(mut seeded: Reconciler) {
        let mut described = todo(2, "b");
        described.description = Some("notes".to_string());
        let refresh = seeded.begin_refresh();
        seeded.settle_refresh(refresh, Ok(vec![described.clone()]));
        let patch = TodoPatch::default().with_description("").with_completed(true);

        let _ticket = seeded.begin_update(TodoId::new(2), &patch).unwrap();
        described.apply(&patch);

        let entry = seeded.cache().get_by_id(TodoId::new(2)).unwrap();
        assert_eq!(entry.description, described.description);
        assert_eq!(entry.completed, described.completed);
        assert_eq!(entry.description, None);
    }

    #[rstest]
    fn update_rejects_pending_or_unknown_target(mut seeded: Reconciler) {
        let result = seeded.begin_update(TodoId::new(42), &TodoPatch::completed(true));
        assert_eq!(result.unwrap_err(), Rejection::NotInCache(TodoId::new(42)));
    }

    #[rstest]
    fn update_rejects_invalid_patch_without_applying(mut seeded: Reconciler) {
        let result = seeded.begin_update(TodoId::new(2), &TodoPatch::title("  "));

        assert!(matches!(result, Err(Rejection::Invalid(_))));
        assert_eq!(titles(&seeded), vec!["c", "b", "a"]);
    }

    #[rstest]
    fn entry_rollback_keeps_unrelated_concurrent_change(mut seeded: Reconciler) {
        let toggle = seeded.begin_toggle(TodoId::new(2)).unwrap();
        let rename = seeded
            .begin_update(TodoId::new(2), &TodoPatch::title("renamed"))
            .unwrap();

        seeded.settle_update(toggle, Err(server_error()));

        let entry = seeded.cache().get_by_id(TodoId::new(2)).unwrap();
        assert!(!entry.completed);
        assert_eq!(entry.title, "renamed");
        let _ = seeded.settle_update(rename, Err(server_error()));
    }

    #[rstest]
    fn entry_rollback_leaves_field_overwritten_by_later_update(mut seeded: Reconciler) {
        let first = seeded
            .begin_update(TodoId::new(2), &TodoPatch::title("first"))
            .unwrap();
        let second = seeded
            .begin_update(TodoId::new(2), &TodoPatch::title("second"))
            .unwrap();

        seeded.settle_update(first, Err(server_error()));

        assert_eq!(seeded.cache().get_by_id(TodoId::new(2)).unwrap().title, "second");
        let _ = seeded.settle_update(second, Ok(todo(2, "second")));
    }

    #[rstest]
    fn cache_rollback_restores_whole_snapshot(mut seeded_cache_scope: Reconciler) {
        let reconciler = &mut seeded_cache_scope;
        let toggle = reconciler.begin_toggle(TodoId::new(2)).unwrap();
        let rename = reconciler
            .begin_update(TodoId::new(3), &TodoPatch::title("renamed"))
            .unwrap();

        reconciler.settle_update(toggle, Err(server_error()));

        assert!(!reconciler.cache().get_by_id(TodoId::new(2)).unwrap().completed);
        assert_eq!(reconciler.cache().get_by_id(TodoId::new(3)).unwrap().title, "c");
        let _ = reconciler.settle_update(rename, Ok(todo(3, "renamed")));
    }

    #[rstest]
    fn last_response_wins_for_concurrent_updates(mut seeded: Reconciler) {
        let first = seeded.begin_update(TodoId::new(1), &TodoPatch::title("x")).unwrap();
        let second = seeded.begin_update(TodoId::new(1), &TodoPatch::title("y")).unwrap();

        seeded.settle_update(second, Ok(todo(1, "y")));
        seeded.settle_update(first, Ok(todo(1, "x")));

        assert_eq!(seeded.cache().get_by_id(TodoId::new(1)).unwrap().title, "x");
    }

    #[rstest]
    fn update_not_found_requires_refresh(mut seeded: Reconciler) {
        let ticket = seeded.begin_toggle(TodoId::new(1)).unwrap();
        let outcome = seeded.settle_update(ticket, Err(TodoError::NotFound(TodoId::new(1))));
        assert!(outcome.refresh_required());
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    #[rstest]
    fn delete_is_visible_immediately_and_confirmed(mut seeded: Reconciler) {
        let ticket = seeded.begin_delete(TodoId::new(2)).unwrap();
        assert_eq!(titles(&seeded), vec!["c", "a"]);

        let outcome = seeded.settle_delete(ticket, Ok(()));

        assert!(outcome.is_confirmed());
        assert_eq!(titles(&seeded), vec!["c", "a"]);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    fn delete_failure_restores_original_order(mut seeded: Reconciler, #[case] id: i64) {
        let ticket = seeded.begin_delete(TodoId::new(id)).unwrap();

        let outcome = seeded.settle_delete(ticket, Err(server_error()));

        assert_eq!(titles(&seeded), vec!["c", "b", "a"]);
        assert!(outcome.message().unwrap().starts_with("Failed to delete todo"));
    }

    #[rstest]
    fn delete_failure_reinserts_after_predecessor(mut seeded: Reconciler) {
        let ticket = seeded.begin_delete(TodoId::new(1)).unwrap();
        let _create = seeded
            .begin_create(ClientId::generate(), "new", None, Timestamp::now())
            .unwrap();

        seeded.settle_delete(ticket, Err(server_error()));

        assert_eq!(titles(&seeded), vec!["new", "c", "b", "a"]);
    }

    #[rstest]
    fn delete_failure_uses_former_index_when_predecessor_gone(mut seeded: Reconciler) {
        let delete_a = seeded.begin_delete(TodoId::new(1)).unwrap();
        let delete_b = seeded.begin_delete(TodoId::new(2)).unwrap();
        seeded.settle_delete(delete_b, Ok(()));

        seeded.settle_delete(delete_a, Err(server_error()));

        assert_eq!(titles(&seeded), vec!["c", "a"]);
    }

    #[rstest]
    fn delete_not_found_requires_refresh(mut seeded: Reconciler) {
        let ticket = seeded.begin_delete(TodoId::new(1)).unwrap();
        let outcome = seeded.settle_delete(ticket, Err(TodoError::NotFound(TodoId::new(1))));
        assert!(outcome.refresh_required());
    }

    #[rstest]
    fn failed_update_and_failed_delete_restore_server_title(mut seeded: Reconciler) {
        let update = seeded
            .begin_update(TodoId::new(2), &TodoPatch::title("x"))
            .unwrap();
        let delete = seeded.begin_delete(TodoId::new(2)).unwrap();

        seeded.settle_update(update, Err(server_error()));
        let outcome = seeded.settle_delete(delete, Err(server_error()));

        assert_eq!(seeded.cache().get_by_id(TodoId::new(2)).unwrap().title, "b");
        assert_eq!(titles(&seeded), vec!["c", "b", "a"]);
        assert_eq!(
            outcome.message().unwrap(),
            "Failed to delete todo \"b\": Internal server error"
        );
    }

    #[rstest]
    fn update_confirmed_during_failed_delete_is_kept(mut seeded: Reconciler) {
        let update = seeded
            .begin_update(TodoId::new(2), &TodoPatch::completed(true))
            .unwrap();
        let delete = seeded.begin_delete(TodoId::new(2)).unwrap();

        let mut record = todo(2, "b");
        record.completed = true;
        seeded.settle_update(update, Ok(record));
        seeded.settle_delete(delete, Err(server_error()));

        assert!(seeded.cache().get_by_id(TodoId::new(2)).unwrap().completed);
    }

    #[rstest]
    fn delete_unknown_is_rejected(mut seeded: Reconciler) {
        assert_eq!(
            seeded.begin_delete(TodoId::new(9)).unwrap_err(),
            Rejection::NotInCache(TodoId::new(9))
        );
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    #[rstest]
    fn refresh_adopts_server_order(mut seeded: Reconciler) {
        let ticket = seeded.begin_refresh();

        let outcome = seeded.settle_refresh(ticket, Ok(vec![todo(1, "a"), todo(4, "d")]));

        assert_eq!(outcome, RefreshOutcome::Applied { count: 2 });
        assert_eq!(titles(&seeded), vec!["a", "d"]);
    }

    #[rstest]
    fn refresh_keeps_existing_client_ids(mut seeded: Reconciler) {
        let before = seeded.cache().get_by_id(TodoId::new(2)).unwrap().client_id;
        let ticket = seeded.begin_refresh();

        seeded.settle_refresh(ticket, Ok(vec![todo(2, "b")]));

        assert_eq!(seeded.cache().get_by_id(TodoId::new(2)).unwrap().client_id, before);
    }

    #[rstest]
    fn newer_refresh_supersedes_older(mut seeded: Reconciler) {
        let older = seeded.begin_refresh();
        let newer = seeded.begin_refresh();

        assert_eq!(seeded.settle_refresh(older, Ok(vec![])), RefreshOutcome::Stale);
        assert_eq!(seeded.cache().len(), 3);
        assert_eq!(
            seeded.settle_refresh(newer, Ok(vec![todo(1, "a")])),
            RefreshOutcome::Applied { count: 1 }
        );
    }

    #[rstest]
    fn mutation_supersedes_outstanding_refresh(mut seeded: Reconciler) {
        let fetch = seeded.begin_refresh();
        let _toggle = seeded.begin_toggle(TodoId::new(1)).unwrap();

        assert_eq!(seeded.settle_refresh(fetch, Ok(vec![])), RefreshOutcome::Stale);
        assert_eq!(seeded.cache().len(), 3);
    }

    #[rstest]
    fn refresh_failure_leaves_cache_untouched(mut seeded: Reconciler) {
        let ticket = seeded.begin_refresh();
        let outcome = seeded.settle_refresh(ticket, Err(server_error()));

        assert_eq!(outcome, RefreshOutcome::Failed(server_error()));
        assert_eq!(titles(&seeded), vec!["c", "b", "a"]);
    }

    #[rstest]
    fn refresh_keeps_unmatched_pending_entries_at_head(mut seeded: Reconciler) {
        let client_id = ClientId::generate();
        let _create = seeded
            .begin_create(client_id, "pending", None, Timestamp::now())
            .unwrap();
        let ticket = seeded.begin_refresh();

        seeded.settle_refresh(ticket, Ok(vec![todo(3, "c")]));

        assert_eq!(titles(&seeded), vec!["pending", "c"]);
        assert!(seeded.cache().get(client_id).unwrap().is_pending());
    }

    #[rstest]
    fn refresh_merges_pending_entry_by_client_id(mut seeded: Reconciler) {
        let client_id = ClientId::generate();
        let create = seeded
            .begin_create(client_id, "new", None, Timestamp::now())
            .unwrap();
        let ticket = seeded.begin_refresh();
        let mut record = todo(4, "new");
        record.client_id = Some(client_id);

        seeded.settle_refresh(ticket, Ok(vec![record.clone(), todo(3, "c")]));

        assert_eq!(seeded.cache().len(), 2);
        assert_eq!(seeded.cache().get(client_id).unwrap().id(), Some(TodoId::new(4)));

        seeded.settle_create(create, Ok(record));
        assert_eq!(seeded.cache().len(), 2);
    }

    #[rstest]
    fn refresh_excludes_entries_with_delete_in_flight(mut seeded: Reconciler) {
        let delete = seeded.begin_delete(TodoId::new(2)).unwrap();
        let ticket = seeded.begin_refresh();

        seeded.settle_refresh(ticket, Ok(vec![todo(3, "c"), todo(2, "b"), todo(1, "a")]));
        assert_eq!(titles(&seeded), vec!["c", "a"]);

        seeded.settle_delete(delete, Ok(()));
        assert_eq!(titles(&seeded), vec!["c", "a"]);
    }

    #[rstest]
    fn refresh_keeps_optimistic_fields_of_updates_in_flight(mut seeded: Reconciler) {
        let toggle = seeded.begin_toggle(TodoId::new(2)).unwrap();
        let ticket = seeded.begin_refresh();

        seeded.settle_refresh(ticket, Ok(vec![todo(3, "c"), todo(2, "b"), todo(1, "a")]));

        assert!(seeded.cache().get_by_id(TodoId::new(2)).unwrap().completed);
        let _ = seeded.settle_update(toggle, Ok(todo(2, "b")));
    }

    #[rstest]
    fn has_in_flight_tracks_outstanding_mutations(mut seeded: Reconciler) {
        assert!(!seeded.has_in_flight());
        let ticket = seeded.begin_toggle(TodoId::new(1)).unwrap();
        assert!(seeded.has_in_flight());
        seeded.settle_update(ticket, Ok(todo(1, "a")));
        assert!(!seeded.has_in_flight());
    }
}

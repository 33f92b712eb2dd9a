//! Client-side cache of todos.
//!
//! An ordered collection of [`TodoEntry`] values keyed by [`ClientId`].
//! Order is the display order: insertion order for local changes and the
//! server's order after a refresh.

use chrono::NaiveDate;

use crate::domain::{ClientId, Timestamp, Todo, TodoId};

// =============================================================================
// Entry
// =============================================================================

/// Whether an entry has been acknowledged by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Inserted optimistically; the service has not assigned an id yet.
    Pending,
    /// Known to the service under this id.
    Confirmed(TodoId),
}

/// A cached todo.
///
/// A pending entry has no `TodoId`, so it cannot be targeted by an update
/// or delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoEntry {
    pub client_id: ClientId,
    pub state: EntryState,
    pub title: String,
    pub completed: bool,
    pub created_at: Timestamp,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl TodoEntry {
    /// Creates a pending entry for a todo the user just submitted.
    #[must_use]
    pub const fn pending(
        client_id: ClientId,
        title: String,
        due_date: Option<NaiveDate>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            client_id,
            state: EntryState::Pending,
            title,
            completed: false,
            created_at,
            description: None,
            due_date,
        }
    }

    /// Creates a confirmed entry from a server record.
    ///
    /// Records without a client id get one derived from their server id.
    #[must_use]
    pub fn from_server(todo: Todo) -> Self {
        let client_id = todo
            .client_id
            .unwrap_or_else(|| ClientId::derived_from(todo.id));
        Self::confirmed(client_id, todo)
    }

    /// Creates a confirmed entry from a server record under a known key.
    #[must_use]
    pub fn confirmed(client_id: ClientId, todo: Todo) -> Self {
        Self {
            client_id,
            state: EntryState::Confirmed(todo.id),
            title: todo.title,
            completed: todo.completed,
            created_at: todo.created_at,
            description: todo.description,
            due_date: todo.due_date,
        }
    }

    /// Returns the server id, if the entry is confirmed.
    #[must_use]
    pub const fn id(&self) -> Option<TodoId> {
        match self.state {
            EntryState::Pending => None,
            EntryState::Confirmed(id) => Some(id),
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, EntryState::Pending)
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Where new entries go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertPosition {
    /// Front of the list, matching a newest-first server order.
    #[default]
    Head,
    Tail,
}

/// Returned when inserting an entry whose client id is already cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Client id {0} is already cached")]
pub struct DuplicateClientId(pub ClientId);

/// Ordered todo cache with at most one entry per client id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoCache {
    entries: Vec<TodoEntry>,
}

impl TodoCache {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builds a cache from server records, keeping their order.
    ///
    /// Later records with an already seen client id are dropped.
    #[must_use]
    pub fn from_server(todos: Vec<Todo>) -> Self {
        let mut cache = Self::new();
        for todo in todos {
            let _ = cache.insert(TodoEntry::from_server(todo), InsertPosition::Tail);
        }
        cache
    }

    #[must_use]
    pub fn entries(&self) -> &[TodoEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TodoEntry> {
        self.entries.iter()
    }

    /// Inserts an entry at the head or tail.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateClientId`] if an entry with the same client id exists.
    pub fn insert(
        &mut self,
        entry: TodoEntry,
        position: InsertPosition,
    ) -> Result<(), DuplicateClientId> {
        let index = match position {
            InsertPosition::Head => 0,
            InsertPosition::Tail => self.entries.len(),
        };
        self.insert_at(index, entry)
    }

    /// Inserts an entry at `index`, clamped to the current length.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateClientId`] if an entry with the same client id exists.
    pub fn insert_at(&mut self, index: usize, entry: TodoEntry) -> Result<(), DuplicateClientId> {
        if self.contains(entry.client_id) {
            return Err(DuplicateClientId(entry.client_id));
        }
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.position(client_id).is_some()
    }

    #[must_use]
    pub fn position(&self, client_id: ClientId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.client_id == client_id)
    }

    #[must_use]
    pub fn position_by_id(&self, id: TodoId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.id() == Some(id))
    }

    #[must_use]
    pub fn get(&self, client_id: ClientId) -> Option<&TodoEntry> {
        self.entries
            .iter()
            .find(|entry| entry.client_id == client_id)
    }

    #[must_use]
    pub fn get_by_id(&self, id: TodoId) -> Option<&TodoEntry> {
        self.entries.iter().find(|entry| entry.id() == Some(id))
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut TodoEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.client_id == client_id)
    }

    pub fn get_mut_by_id(&mut self, id: TodoId) -> Option<&mut TodoEntry> {
        self.entries.iter_mut().find(|entry| entry.id() == Some(id))
    }

    /// Removes an entry by client id, returning it with its former index.
    pub fn remove(&mut self, client_id: ClientId) -> Option<(usize, TodoEntry)> {
        let index = self.position(client_id)?;
        Some((index, self.entries.remove(index)))
    }

    /// Removes an entry by server id, returning it with its former index.
    pub fn remove_by_id(&mut self, id: TodoId) -> Option<(usize, TodoEntry)> {
        let index = self.position_by_id(id)?;
        Some((index, self.entries.remove(index)))
    }

    /// Replaces the entry with the same client id in place.
    ///
    /// Returns the previous entry, or `None` (leaving the cache unchanged)
    /// if no entry has that client id.
    pub fn replace(&mut self, entry: TodoEntry) -> Option<TodoEntry> {
        let slot = self.get_mut(entry.client_id)?;
        Some(std::mem::replace(slot, entry))
    }

    /// Keeps only the entries matching the predicate, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&TodoEntry) -> bool) {
        self.entries.retain(keep);
    }
}

impl<'a> IntoIterator for &'a TodoCache {
    type Item = &'a TodoEntry;
    type IntoIter = std::slice::Iter<'a, TodoEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

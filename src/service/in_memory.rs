//! In-memory implementation of the CRUD service.
//!
//! Thread-safe with `Arc<RwLock<...>>`. Records are kept newest first so
//! `list` needs no sorting.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::RwLock;

use super::{ServiceFuture, TodoError, TodoService};
use crate::domain::{NewTodo, Timestamp, Todo, TodoConstraints, TodoId, TodoPatch};

#[derive(Debug, Default)]
struct Table {
    /// Newest first.
    rows: Vec<Todo>,
    last_id: i64,
}

impl Table {
    fn title_taken(&self, title: &str, except: Option<TodoId>) -> bool {
        self.rows
            .iter()
            .any(|todo| todo.title == title && Some(todo.id) != except)
    }
}

/// In-memory CRUD service.
///
/// Cloning shares the underlying table.
#[derive(Debug, Clone)]
pub struct InMemoryTodoService {
    table: Arc<RwLock<Table>>,
    constraints: TodoConstraints,
    unique_titles: bool,
}

impl InMemoryTodoService {
    /// Creates an empty service with server-side limits and unique titles.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::default())),
            constraints: TodoConstraints::server(),
            unique_titles: true,
        }
    }

    #[must_use]
    pub const fn with_constraints(mut self, constraints: TodoConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub const fn with_unique_titles(mut self, unique_titles: bool) -> Self {
        self.unique_titles = unique_titles;
        self
    }

    /// Returns the number of stored todos.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryTodoService {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoService for InMemoryTodoService {
    fn list(&self) -> ServiceFuture<'_, Vec<Todo>> {
        let table = Arc::clone(&self.table);
        async move { Ok(table.read().await.rows.clone()) }.boxed()
    }

    fn create(&self, new_todo: NewTodo) -> ServiceFuture<'_, Todo> {
        let table = Arc::clone(&self.table);
        let constraints = self.constraints;
        let unique_titles = self.unique_titles;

        async move {
            let new_todo = constraints.validate_new(&new_todo)?;
            let mut guard = table.write().await;

            if let Some(client_id) = new_todo.client_id
                && let Some(existing) = guard
                    .rows
                    .iter()
                    .find(|todo| todo.client_id == Some(client_id))
            {
                return Ok(existing.clone());
            }
            if unique_titles && guard.title_taken(&new_todo.title, None) {
                return Err(TodoError::Duplicate {
                    title: new_todo.title,
                });
            }

            guard.last_id += 1;
            let todo = Todo {
                id: TodoId::new(guard.last_id),
                client_id: new_todo.client_id,
                title: new_todo.title,
                completed: false,
                created_at: Timestamp::now(),
                description: None,
                due_date: new_todo.due_date,
            };
            guard.rows.insert(0, todo.clone());
            Ok(todo)
        }
        .boxed()
    }

    fn update(&self, id: TodoId, patch: TodoPatch) -> ServiceFuture<'_, Todo> {
        let table = Arc::clone(&self.table);
        let constraints = self.constraints;
        let unique_titles = self.unique_titles;

        async move {
            let patch = constraints.validate_patch(&patch)?;
            let mut guard = table.write().await;

            if unique_titles
                && let Some(title) = &patch.title
                && guard.title_taken(title, Some(id))
            {
                return Err(TodoError::Duplicate {
                    title: title.clone(),
                });
            }

            let todo = guard
                .rows
                .iter_mut()
                .find(|todo| todo.id == id)
                .ok_or(TodoError::NotFound(id))?;
            todo.apply(&patch);
            Ok(todo.clone())
        }
        .boxed()
    }

    fn delete(&self, id: TodoId) -> ServiceFuture<'_, ()> {
        let table = Arc::clone(&self.table);

        async move {
            let mut guard = table.write().await;
            let position = guard
                .rows
                .iter()
                .position(|todo| todo.id == id)
                .ok_or(TodoError::NotFound(id))?;
            guard.rows.remove(position);
            Ok(())
        }
        .boxed()
    }
}

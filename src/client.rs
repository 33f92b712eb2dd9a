//! Async driver around the reconciliation engine.
//!
//! [`TodoClient`] pairs a [`Reconciler`] with a [`TodoService`]. Each
//! operation runs `begin → service call → settle`: the optimistic change is
//! visible in [`TodoClient::todos`] as soon as the call starts, and the
//! returned [`Outcome`] tells the caller what finally happened. Calls never
//! fail; service errors become `Outcome::Reverted`.
//!
//! The reconciler sits behind a `parking_lot::Mutex` that is only locked
//! between awaits, so any number of operations can run concurrently.

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::cache::TodoEntry;
use crate::domain::{ClientId, Timestamp, Todo, TodoId, TodoPatch};
use crate::reconcile::{
    Outcome, Reconciler, ReconcilerConfig, RefreshOutcome, Rejection, UpdateTicket,
};
use crate::service::TodoService;

/// Handle to a todo list kept in sync with a service.
///
/// Cloning is cheap and shares the cache.
pub struct TodoClient<S: ?Sized> {
    state: Arc<Mutex<Reconciler>>,
    service: Arc<S>,
}

impl<S: ?Sized> Clone for TodoClient<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: TodoService + ?Sized> TodoClient<S> {
    /// Creates a client with an empty cache. Call [`refresh`](Self::refresh)
    /// to load the list.
    #[must_use]
    pub fn new(service: Arc<S>, config: ReconcilerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(Reconciler::new(config))),
            service,
        }
    }

    /// Creates a client whose cache starts with already fetched records.
    #[must_use]
    pub fn with_todos(service: Arc<S>, config: ReconcilerConfig, todos: Vec<Todo>) -> Self {
        Self {
            state: Arc::new(Mutex::new(Reconciler::with_todos(config, todos))),
            service,
        }
    }

    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Returns a snapshot of the cached list, optimistic changes included.
    #[must_use]
    pub fn todos(&self) -> Vec<TodoEntry> {
        self.state.lock().cache().entries().to_vec()
    }

    /// Returns true while any mutation is awaiting the service.
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        self.state.lock().has_in_flight()
    }

    /// Fetches the list and replaces the cache unless superseded.
    pub async fn refresh(&self) -> RefreshOutcome {
        let ticket = self.state.lock().begin_refresh();
        let result = self.service.list().await;
        let outcome = self.state.lock().settle_refresh(ticket, result);
        match &outcome {
            RefreshOutcome::Applied { count } => tracing::debug!(count, "Todo list refreshed"),
            RefreshOutcome::Stale => tracing::debug!("Discarded stale todo list"),
            RefreshOutcome::Failed(error) => tracing::warn!(%error, "Failed to load todos"),
        }
        outcome
    }

    /// Creates a todo.
    pub async fn create(&self, title: &str) -> Outcome {
        self.create_with_due_date(title, None).await
    }

    /// Creates a todo with an optional due date.
    pub async fn create_with_due_date(&self, title: &str, due_date: Option<NaiveDate>) -> Outcome {
        let client_id = ClientId::generate();
        let begun = self
            .state
            .lock()
            .begin_create(client_id, title, due_date, Timestamp::now());
        let ticket = match begun {
            Ok(ticket) => ticket,
            Err(rejection) => {
                tracing::debug!(%rejection, "Create rejected");
                return Outcome::Rejected(rejection);
            }
        };
        tracing::debug!(%client_id, title = ticket.title(), "Optimistic create applied");

        let result = self.service.create(ticket.request().clone()).await;
        let outcome = self.state.lock().settle_create(ticket, result);
        self.finish("create", outcome).await
    }

    /// Applies a partial update.
    pub async fn update(&self, id: TodoId, patch: TodoPatch) -> Outcome {
        let begun = self.state.lock().begin_update(id, &patch);
        self.send_update(id, begun).await
    }

    /// Flips the completion flag.
    pub async fn toggle(&self, id: TodoId) -> Outcome {
        let begun = self.state.lock().begin_toggle(id);
        self.send_update(id, begun).await
    }

    /// Edits the detail fields. `None` leaves a field unchanged; an empty
    /// description or `Some(None)` due date clears it.
    pub async fn edit(
        &self,
        id: TodoId,
        title: Option<&str>,
        description: Option<&str>,
        due_date: Option<Option<NaiveDate>>,
    ) -> Outcome {
        let patch = TodoPatch {
            title: title.map(str::to_string),
            completed: None,
            description: description.map(str::to_string),
            due_date,
        };
        self.update(id, patch).await
    }

    async fn send_update(
        &self,
        id: TodoId,
        begun: Result<UpdateTicket, Rejection>,
    ) -> Outcome {
        let ticket = match begun {
            Ok(ticket) => ticket,
            Err(rejection) => {
                tracing::debug!(%id, %rejection, "Update rejected");
                return Outcome::Rejected(rejection);
            }
        };
        tracing::debug!(%id, title = ticket.title(), "Optimistic update applied");

        let result = self.service.update(id, ticket.patch().clone()).await;
        let outcome = self.state.lock().settle_update(ticket, result);
        self.finish("update", outcome).await
    }

    /// Deletes a todo.
    pub async fn delete(&self, id: TodoId) -> Outcome {
        let begun = self.state.lock().begin_delete(id);
        let ticket = match begun {
            Ok(ticket) => ticket,
            Err(rejection) => {
                tracing::debug!(%id, %rejection, "Delete rejected");
                return Outcome::Rejected(rejection);
            }
        };
        tracing::debug!(%id, title = ticket.title(), "Optimistic delete applied");

        let result = self.service.delete(id).await;
        let outcome = self.state.lock().settle_delete(ticket, result);
        self.finish("delete", outcome).await
    }

    async fn finish(&self, action: &'static str, outcome: Outcome) -> Outcome {
        match &outcome {
            Outcome::Confirmed(entry) => {
                tracing::info!(action, client_id = %entry.client_id, title = %entry.title, "Mutation confirmed");
            }
            Outcome::Reverted(failure) => {
                tracing::warn!(action, error = %failure.error, "{}", failure.message);
            }
            Outcome::Rejected(_) => {}
        }
        if outcome.refresh_required() {
            self.refresh().await;
        }
        outcome
    }
}

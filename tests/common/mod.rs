//! Common test helpers for the reconciliation integration tests.
//!
//! Each integration test file is compiled as its own crate, so helpers used by
//! only one of them would otherwise warn as dead code.

#![allow(dead_code)]

use std::sync::Arc;

use todo_sync::prelude::*;

/// Comparable view of a todo: id, title, completed.
pub type Row = (TodoId, String, bool);

/// Builds a server record without a client id.
pub fn todo(id: i64, title: &str) -> Todo {
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

/// In-memory service that accepts duplicate titles.
pub fn permissive_service() -> InMemoryTodoService {
    InMemoryTodoService::new().with_unique_titles(false)
}

/// Creates the given titles in order, so the last one is listed first.
pub async fn seed(service: &InMemoryTodoService, titles: &[&str]) {
    for title in titles {
        service
            .create(NewTodo::new(*title))
            .await
            .expect("seeding must succeed");
    }
}

/// A client over `service` with its cache already loaded.
pub async fn loaded_client<S: TodoService + ?Sized>(
    service: Arc<S>,
    config: ReconcilerConfig,
) -> TodoClient<S> {
    let client = TodoClient::new(service, config);
    let outcome = client.refresh().await;
    assert!(matches!(outcome, RefreshOutcome::Applied { .. }));
    client
}

/// Confirmed rows of the client cache, in display order.
pub fn cache_rows<S: TodoService + ?Sized>(client: &TodoClient<S>) -> Vec<Row> {
    client
        .todos()
        .into_iter()
        .filter_map(|entry| entry.id().map(|id| (id, entry.title, entry.completed)))
        .collect()
}

/// Rows as the service lists them.
pub async fn store_rows<S: TodoService + ?Sized>(service: &S) -> Vec<Row> {
    service
        .list()
        .await
        .expect("listing must succeed")
        .into_iter()
        .map(|todo| (todo.id, todo.title, todo.completed))
        .collect()
}

pub fn titles<S: TodoService + ?Sized>(client: &TodoClient<S>) -> Vec<String> {
    client.todos().into_iter().map(|entry| entry.title).collect()
}

/// Fail injection that fails every call before it reaches the service.
pub fn always_failing() -> FailInjectionConfig {
    FailInjectionConfig::deterministic(1.0, 0, 0.0, 0).expect("valid config")
}

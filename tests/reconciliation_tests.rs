//! Integration tests for optimistic mutations against a live service.
//!
//! Slow services are simulated with delay injection on a paused clock, so the
//! optimistic state can be inspected while the call is still in flight.

mod common;

use std::sync::Arc;

use rstest::rstest;
use todo_sync::prelude::*;
use todo_sync::service::InjectionPhase;

use common::{always_failing, loaded_client, permissive_service, seed, store_rows, titles};

fn slow(failure_rate: f64) -> FailInjectionConfig {
    FailInjectionConfig::deterministic(failure_rate, 100, 0.0, 11).expect("valid config")
}

/// Lets spawned tasks run up to their first suspension point.
async fn let_spawned_start() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

/// A client whose cache holds the store's current rows and whose calls go
/// through `injection`.
async fn client_over(
    store: &Arc<InMemoryTodoService>,
    injection: FailInjectionConfig,
    config: ReconcilerConfig,
) -> TodoClient<FailInjectingService<Arc<InMemoryTodoService>>> {
    let todos = store.list().await.expect("list");
    let service = FailInjectingService::new(Arc::clone(store), injection);
    TodoClient::with_todos(Arc::new(service), config, todos)
}

fn with_rollback(rollback: RollbackScope) -> ReconcilerConfig {
    ReconcilerConfig {
        rollback,
        ..ReconcilerConfig::default()
    }
}

// =============================================================================
// Create
// =============================================================================

#[rstest]
#[tokio::test(start_paused = true)]
async fn create_shows_exactly_one_entry_before_and_after_answer() {
    let store = Arc::new(InMemoryTodoService::new());
    let client = client_over(&store, slow(0.0), ReconcilerConfig::default()).await;

    let handle = tokio::spawn({
        let client = client.clone();
        async move { client.create("Buy milk").await }
    });
    let_spawned_start().await;

    let pending = client.todos();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_pending());

    let outcome = handle.await.expect("task must not panic");
    assert!(outcome.is_confirmed());
    let confirmed = client.todos();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].client_id, pending[0].client_id);
    assert!(!confirmed[0].is_pending());
}

#[rstest]
#[tokio::test]
async fn failed_create_leaves_no_entry_with_that_title() {
    let store = Arc::new(InMemoryTodoService::new());
    let client = client_over(&store, always_failing(), ReconcilerConfig::default()).await;

    let outcome = client.create("Doomed").await;

    assert_eq!(
        outcome.message().as_deref(),
        Some("Failed to create todo \"Doomed\": Injected failure")
    );
    assert!(client.todos().iter().all(|entry| entry.title != "Doomed"));
    assert!(store.is_empty().await);
}

#[rstest]
#[tokio::test]
async fn duplicate_title_is_reverted_with_named_message() {
    let store = Arc::new(InMemoryTodoService::new());
    seed(&store, &["Taken"]).await;
    let client = loaded_client(Arc::clone(&store), ReconcilerConfig::default()).await;

    let outcome = client.create("Taken").await;

    let Outcome::Reverted(failure) = outcome else {
        panic!("expected a reverted create, got {outcome:?}");
    };
    assert_eq!(failure.error.kind(), ErrorKind::Validation);
    assert!(failure.message.starts_with("Failed to create todo \"Taken\""));
    assert_eq!(titles(&client), vec!["Taken"]);
}

#[rstest]
#[tokio::test]
async fn equal_titles_with_distinct_client_ids_stay_separate() {
    let store = Arc::new(permissive_service());
    let client = TodoClient::new(Arc::clone(&store), ReconcilerConfig::default());

    let (first, second) = tokio::join!(client.create("Same"), client.create("Same"));

    assert!(first.is_confirmed() && second.is_confirmed());
    let todos = client.todos();
    assert_eq!(todos.len(), 2);
    assert_ne!(todos[0].client_id, todos[1].client_id);
    assert_ne!(todos[0].id(), todos[1].id());
    assert_eq!(store.len().await, 2);
}

#[rstest]
#[tokio::test]
async fn lost_answer_reverts_and_reload_recovers_record() {
    let store = Arc::new(InMemoryTodoService::new());
    let client = client_over(
        &store,
        always_failing().with_phase(InjectionPhase::After),
        ReconcilerConfig::default(),
    )
    .await;

    let outcome = client.create("Written").await;
    assert!(matches!(outcome, Outcome::Reverted(_)));
    assert!(client.todos().is_empty());

    let reloaded = loaded_client(store, ReconcilerConfig::default()).await;
    assert_eq!(titles(&reloaded), vec!["Written"]);
}

// =============================================================================
// Update
// =============================================================================

#[rstest]
#[case(RollbackScope::Entry)]
#[case(RollbackScope::Cache)]
#[tokio::test(start_paused = true)]
async fn failed_toggle_is_visible_then_reverted(#[case] rollback: RollbackScope) {
    let store = Arc::new(InMemoryTodoService::new());
    seed(&store, &["a", "b"]).await;
    let client = client_over(&store, slow(1.0), with_rollback(rollback)).await;
    let id = client.todos()[1].id().expect("confirmed");

    let handle = tokio::spawn({
        let client = client.clone();
        async move { client.toggle(id).await }
    });
    let_spawned_start().await;
    assert!(client.todos()[1].completed);

    let outcome = handle.await.expect("task must not panic");

    assert_eq!(
        outcome.message().as_deref(),
        Some("Failed to update todo \"a\": Injected failure")
    );
    assert!(!client.todos()[1].completed);
    assert!(!store_rows(store.as_ref()).await[1].2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rename_success_is_visible_immediately_and_persisted() {
    let store = Arc::new(InMemoryTodoService::new());
    seed(&store, &["old"]).await;
    let client = client_over(&store, slow(0.0), ReconcilerConfig::default()).await;
    let id = client.todos()[0].id().expect("confirmed");

    let handle = tokio::spawn({
        let client = client.clone();
        async move { client.update(id, TodoPatch::title("new")).await }
    });
    let_spawned_start().await;
    assert_eq!(titles(&client), vec!["new"]);

    assert!(handle.await.expect("task must not panic").is_confirmed());
    assert_eq!(store_rows(store.as_ref()).await[0].1, "new");
}

#[rstest]
#[tokio::test]
async fn update_of_todo_deleted_elsewhere_refreshes_list() {
    let store = Arc::new(InMemoryTodoService::new());
    seed(&store, &["kept", "gone"]).await;
    let client = loaded_client(Arc::clone(&store), ReconcilerConfig::default()).await;
    let gone = client.todos()[0].id().expect("confirmed");
    store.delete(gone).await.expect("delete");

    let outcome = client.toggle(gone).await;

    let Outcome::Reverted(failure) = outcome else {
        panic!("expected a reverted update, got {outcome:?}");
    };
    assert!(failure.refresh_required);
    assert_eq!(titles(&client), vec!["kept"]);
}

// =============================================================================
// Delete
// =============================================================================

#[rstest]
#[case(RollbackScope::Entry, 0)]
#[case(RollbackScope::Entry, 1)]
#[case(RollbackScope::Entry, 2)]
#[case(RollbackScope::Cache, 1)]
#[tokio::test(start_paused = true)]
async fn failed_delete_is_visible_then_restored_in_order(
    #[case] rollback: RollbackScope,
    #[case] index: usize,
) {
    let store = Arc::new(InMemoryTodoService::new());
    seed(&store, &["a", "b", "c"]).await;
    let client = client_over(&store, slow(1.0), with_rollback(rollback)).await;
    let target = client.todos()[index].clone();
    let id = target.id().expect("confirmed");

    let handle = tokio::spawn({
        let client = client.clone();
        async move { client.delete(id).await }
    });
    let_spawned_start().await;
    assert_eq!(client.todos().len(), 2);
    assert!(client.todos().iter().all(|entry| entry.client_id != target.client_id));

    let outcome = handle.await.expect("task must not panic");

    assert_eq!(
        outcome.message(),
        Some(format!(
            "Failed to delete todo \"{}\": Injected failure",
            target.title
        ))
    );
    assert_eq!(titles(&client), vec!["c", "b", "a"]);
}

#[rstest]
#[tokio::test]
async fn delete_success_removes_from_store() {
    let store = Arc::new(InMemoryTodoService::new());
    seed(&store, &["a", "b"]).await;
    let client = loaded_client(Arc::clone(&store), ReconcilerConfig::default()).await;
    let id = client.todos()[0].id().expect("confirmed");

    assert!(client.delete(id).await.is_confirmed());

    assert_eq!(titles(&client), vec!["a"]);
    assert_eq!(store.len().await, 1);
}

// =============================================================================
// Refresh
// =============================================================================

#[rstest]
#[tokio::test(start_paused = true)]
async fn refresh_started_before_mutation_is_discarded() {
    let store = Arc::new(InMemoryTodoService::new());
    seed(&store, &["a"]).await;
    let client = client_over(&store, slow(0.0), ReconcilerConfig::default()).await;
    let id = client.todos()[0].id().expect("confirmed");

    let refresh = tokio::spawn({
        let client = client.clone();
        async move { client.refresh().await }
    });
    let_spawned_start().await;
    let toggle = tokio::spawn({
        let client = client.clone();
        async move { client.toggle(id).await }
    });

    assert_eq!(refresh.await.expect("task must not panic"), RefreshOutcome::Stale);
    assert!(toggle.await.expect("task must not panic").is_confirmed());
    assert!(client.todos()[0].completed);
}

//! Job Store lifecycle tests: monotone transitions, terminal immutability,
//! result/error mutual exclusivity.

mod common;

use common::{descriptor_from, test_store};
use orbitald::store::{JobStatus, StoreError};
use serde_json::json;

fn sample_descriptor() -> orbitald::workflow::WorkflowDescriptor {
    descriptor_from(json!({
        "workflow": {"steps": [{"action": "screenshot"}]},
        "options": {"timeout": 30000}
    }))
}

#[tokio::test]
async fn create_starts_pending_with_zero_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir).await;

    let row = store.create(&sample_descriptor()).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Pending);
    assert_eq!(row.attempts, 0);
    assert!(row.started_at.is_none());
    assert!(row.result_json.is_none());
    assert!(row.error_message.is_none());
    // The persisted descriptor round-trips.
    assert_eq!(row.descriptor().unwrap(), sample_descriptor());
}

#[tokio::test]
async fn running_increments_attempts_and_stamps_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir).await;
    let row = store.create(&sample_descriptor()).await.unwrap();

    store.mark_running(&row.id).await.unwrap();
    let row = store.get(&row.id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Running);
    assert_eq!(row.attempts, 1);
    let first_start = row.started_at.clone().expect("started_at set");

    // A second start (re-queued after a crash) bumps attempts but keeps the
    // original start time.
    store.mark_running(&row.id).await.unwrap();
    let row = store.get(&row.id).await.unwrap();
    assert_eq!(row.attempts, 2);
    assert_eq!(row.started_at.as_deref(), Some(first_start.as_str()));
}

#[tokio::test]
async fn completed_jobs_have_result_and_no_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir).await;
    let row = store.create(&sample_descriptor()).await.unwrap();
    store.mark_running(&row.id).await.unwrap();

    let result = json!({"artifacts": [], "steps_completed": 1});
    store.mark_completed(&row.id, &result).await.unwrap();

    let row = store.get(&row.id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Completed);
    assert!(row.finished_at.is_some());
    assert!(row.error_message.is_none(), "completed job must have no error");
    let stored: serde_json::Value = serde_json::from_str(row.result_json.as_deref().unwrap()).unwrap();
    assert_eq!(stored, result);
}

#[tokio::test]
async fn failed_jobs_have_error_and_no_result() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir).await;
    let row = store.create(&sample_descriptor()).await.unwrap();
    store.mark_running(&row.id).await.unwrap();
    store.mark_failed(&row.id, "step 0 (goto): boom").await.unwrap();

    let row = store.get(&row.id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Failed);
    assert_eq!(row.error_message.as_deref(), Some("step 0 (goto): boom"));
    assert!(row.result_json.is_none(), "failed job must have no result");
}

#[tokio::test]
async fn timeout_uses_fixed_message() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir).await;
    let row = store.create(&sample_descriptor()).await.unwrap();
    store.mark_running(&row.id).await.unwrap();
    store.mark_timeout(&row.id).await.unwrap();

    let row = store.get(&row.id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Timeout);
    assert_eq!(row.error_message.as_deref(), Some("Execution timed out"));
    assert!(row.result_json.is_none());
}

#[tokio::test]
async fn terminal_states_never_change_again() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir).await;

    for terminal in ["completed", "failed", "timeout"] {
        let row = store.create(&sample_descriptor()).await.unwrap();
        store.mark_running(&row.id).await.unwrap();
        match terminal {
            "completed" => store.mark_completed(&row.id, &json!({})).await.unwrap(),
            "failed" => store.mark_failed(&row.id, "x").await.unwrap(),
            _ => store.mark_timeout(&row.id).await.unwrap(),
        }

        // Every further transition is refused.
        assert!(matches!(
            store.mark_running(&row.id).await,
            Err(StoreError::InvalidTransition { .. })
        ), "running after {terminal}");
        assert!(matches!(
            store.mark_completed(&row.id, &json!({})).await,
            Err(StoreError::InvalidTransition { .. })
        ), "completed after {terminal}");
        assert!(matches!(
            store.mark_failed(&row.id, "y").await,
            Err(StoreError::InvalidTransition { .. })
        ), "failed after {terminal}");
        assert!(matches!(
            store.mark_timeout(&row.id).await,
            Err(StoreError::InvalidTransition { .. })
        ), "timeout after {terminal}");

        let after = store.get(&row.id).await.unwrap();
        assert_eq!(after.status, terminal, "status must stay {terminal}");
    }
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir).await;
    assert!(matches!(
        store.get("no-such-job").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.mark_running("no-such-job").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_returns_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(store.create(&sample_descriptor()).await.unwrap().id);
        // Space the inserts so the RFC3339 order keys differ.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let listed = store.list(10, 0).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].id, ids[2], "newest job listed first");
}

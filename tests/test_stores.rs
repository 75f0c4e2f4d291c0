//! Tests for the run store implementations: persistence, conditional
//! mutation semantics, and runnable listing.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use stepline::engine::types::{LaunchRequest, LaunchStep, Run, RunStatus};
use stepline::storage::json_store::JsonRunStore;
use stepline::storage::memory_store::MemoryRunStore;
use stepline::storage::{RunStore, TxOutcome};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
}

fn make_run(name: &str) -> Run {
    Run::from_launch(
        LaunchRequest {
            workspace_id: "ws-1".to_string(),
            name: name.to_string(),
            steps: vec![LaunchStep {
                step_id: None,
                order: None,
                agent_type: "system.echo".to_string(),
                instruction: "hi".to_string(),
                status: None,
                attempts: None,
            }],
            context: None,
        },
        now(),
    )
}

// --- JSON store ---

#[tokio::test]
async fn json_store_persists_and_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());

    let run = make_run("persisted");
    store.create_run(&run).await.unwrap();

    let back = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(back.id, run.id);
    assert_eq!(back.name, "persisted");
    assert_eq!(back.status, RunStatus::Queued);
}

#[tokio::test]
async fn json_store_get_missing_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());

    assert!(store.get_run("no-such-run").await.unwrap().is_none());
}

#[tokio::test]
async fn json_store_mutation_commits() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());

    let run = make_run("mutated");
    store.create_run(&run).await.unwrap();

    let outcome = store
        .mutate_run(&run.id, &mut |r| {
            r.status = RunStatus::Running;
            true
        })
        .await
        .unwrap();
    assert_eq!(outcome, TxOutcome::Committed);

    let back = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(back.status, RunStatus::Running);
}

#[tokio::test]
async fn json_store_rejected_mutation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());

    let run = make_run("untouched");
    store.create_run(&run).await.unwrap();

    let outcome = store
        .mutate_run(&run.id, &mut |r| {
            r.status = RunStatus::Canceled;
            false
        })
        .await
        .unwrap();
    assert_eq!(outcome, TxOutcome::Rejected);

    let back = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(back.status, RunStatus::Queued);
}

#[tokio::test]
async fn json_store_mutation_on_missing_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());

    let outcome = store
        .mutate_run("no-such-run", &mut |_| true)
        .await
        .unwrap();
    assert_eq!(outcome, TxOutcome::NotFound);
}

#[tokio::test]
async fn json_store_lists_with_status_filter() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());

    let queued = make_run("queued-run");
    store.create_run(&queued).await.unwrap();

    let done = make_run("done-run");
    store.create_run(&done).await.unwrap();
    store
        .mutate_run(&done.id, &mut |r| {
            r.status = RunStatus::Succeeded;
            true
        })
        .await
        .unwrap();

    let all = store.list_runs(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let succeeded = store.list_runs(Some(RunStatus::Succeeded)).await.unwrap();
    assert_eq!(succeeded.len(), 1);
    assert_eq!(succeeded[0].name, "done-run");
}

#[tokio::test]
async fn json_store_delete_removes_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());

    let run = make_run("doomed");
    store.create_run(&run).await.unwrap();
    store.delete_run(&run.id).await.unwrap();

    assert!(store.get_run(&run.id).await.unwrap().is_none());
    // Deleting again is fine.
    store.delete_run(&run.id).await.unwrap();
}

// --- Runnable listing (both stores share the semantics) ---

#[tokio::test]
async fn runnable_listing_respects_cooldowns_and_terminal_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());

    let ready = make_run("ready");
    store.create_run(&ready).await.unwrap();

    let cooling = make_run("cooling");
    store.create_run(&cooling).await.unwrap();
    store
        .mutate_run(&cooling.id, &mut |r| {
            r.next_runnable_at = Some(now() + Duration::seconds(60));
            true
        })
        .await
        .unwrap();

    let finished = make_run("finished");
    store.create_run(&finished).await.unwrap();
    store
        .mutate_run(&finished.id, &mut |r| {
            r.status = RunStatus::Succeeded;
            true
        })
        .await
        .unwrap();

    let eligible = store.list_runnable(now(), 10).await.unwrap();
    assert_eq!(eligible, vec![ready.id.clone()]);

    // Once the cooldown elapses the second run shows up too.
    let eligible = store
        .list_runnable(now() + Duration::seconds(60), 10)
        .await
        .unwrap();
    assert_eq!(eligible.len(), 2);

    // The limit caps the batch.
    let eligible = store
        .list_runnable(now() + Duration::seconds(60), 1)
        .await
        .unwrap();
    assert_eq!(eligible.len(), 1);
}

// --- Memory store ---

#[tokio::test]
async fn memory_store_basic_round_trip() {
    let store = MemoryRunStore::new();

    let run = make_run("in-memory");
    store.create_run(&run).await.unwrap();

    let back = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(back.name, "in-memory");

    store.delete_run(&run.id).await.unwrap();
    assert!(store.get_run(&run.id).await.unwrap().is_none());
}

#[tokio::test]
async fn memory_store_mutations_are_atomic_under_contention() {
    let store = Arc::new(MemoryRunStore::new());

    let run = make_run("counter");
    let run_id = run.id.clone();
    store.create_run(&run).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = store.clone();
        let run_id = run_id.clone();
        handles.push(tokio::spawn(async move {
            store
                .mutate_run(&run_id, &mut |r| {
                    let current = r
                        .context
                        .get("count")
                        .and_then(|v| v.as_i64())
                        .unwrap_or(0);
                    r.context
                        .insert("count".to_string(), serde_json::json!(current + 1));
                    true
                })
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), TxOutcome::Committed);
    }

    let back = store.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(back.context.get("count").unwrap().as_i64().unwrap(), 50);
}

#[tokio::test]
async fn memory_store_rejected_mutation_leaves_no_trace() {
    let store = MemoryRunStore::new();

    let run = make_run("scratch");
    store.create_run(&run).await.unwrap();

    store
        .mutate_run(&run.id, &mut |r| {
            r.status = RunStatus::Failed;
            r.context.insert("oops".to_string(), serde_json::json!(1));
            false
        })
        .await
        .unwrap();

    let back = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(back.status, RunStatus::Queued);
    assert!(back.context.is_empty());
}

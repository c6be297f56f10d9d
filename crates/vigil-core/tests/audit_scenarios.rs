//! Audit Engine integration tests: verdicts, strict execution, determinism and
//! all-or-nothing persistence of the audit run.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Fleet, Script, ScriptedRunner};
use tempfile::{NamedTempFile, TempDir};
use vigil_core::{AuditConfig, AuditEngine, Verdict, VigilError};
use vigil_ledger::fakes::MemoryLedgerStore;
use vigil_ledger::{keys, FsLedgerStore, LedgerStore, StorageError};

fn memory_fleet() -> (Arc<MemoryLedgerStore>, Fleet) {
    let store = Arc::new(MemoryLedgerStore::new());
    let fleet = Fleet::new(store.clone());
    (store, fleet)
}

/// Test: A has a fresh echo and an intent, B has neither.
#[tokio::test]
async fn test_fresh_agent_passes_silent_agent_fails() {
    let (_store, fleet) = memory_fleet();
    fleet.hydrate(&["A", "B"]).await;
    fleet.healthy("A").await;
    fleet.clock.advance(Duration::from_secs(2));

    let run = AuditEngine::new(fleet.store.clone(), fleet.shared_clock(), AuditConfig::default())
        .run()
        .await
        .unwrap();

    let a = run.result_for("A").unwrap();
    assert_eq!(a.verdict, Verdict::Pass);
    assert!(a.echo_fresh && a.intent_declared);
    assert_eq!(a.exit_code, None);
    assert_eq!(a.reason, None);

    let b = run.result_for("B").unwrap();
    assert_eq!(b.verdict, Verdict::Fail);
    assert!(!b.echo_fresh && !b.intent_declared);

    let json = serde_json::to_value(&run).unwrap();
    assert_eq!(json["results"][0]["verdict"], "PASS");
    assert_eq!(json["results"][1]["verdict"], "FAIL");
    assert!(json["results"][0]["exit_code"].is_null());
}

/// Test: echo without intent, and intent without echo, both fail.
#[tokio::test]
async fn test_both_signals_are_required() {
    let (_store, fleet) = memory_fleet();
    fleet.hydrate(&["echo_only", "intent_only"]).await;
    fleet.echo.commit_echo("echo_only").await.unwrap();
    fleet.intent.declare_intent("intent_only", None).await.unwrap();

    let run = AuditEngine::new(fleet.store.clone(), fleet.shared_clock(), AuditConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(run.passed_count(), 0);
    assert_eq!(run.result_for("echo_only").unwrap().reason.as_deref(), Some("no_intent"));
    assert_eq!(run.result_for("intent_only").unwrap().reason.as_deref(), Some("no_echo"));
}

/// Test: ghosts with perfect liveness are never audited.
#[tokio::test]
async fn test_ghosts_are_not_audit_subjects() {
    let (_store, fleet) = memory_fleet();
    fleet.hydrate(&["A"]).await;
    fleet.healthy("A").await;
    fleet.healthy("ghost").await;

    let run = AuditEngine::new(fleet.store.clone(), fleet.shared_clock(), AuditConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(run.results.len(), 1);
    assert!(run.result_for("ghost").is_none());
}

/// Test: same ledger state and clock give the same verdicts.
#[tokio::test]
async fn test_audit_is_deterministic() {
    let (_store, fleet) = memory_fleet();
    fleet.hydrate(&["A", "B", "C"]).await;
    fleet.healthy("A").await;
    fleet.echo.commit_echo("C").await.unwrap();
    fleet.clock.advance(Duration::from_secs(5));

    let engine = AuditEngine::new(fleet.store.clone(), fleet.shared_clock(), AuditConfig::default());
    let first = engine.run().await.unwrap();
    let second = engine.run().await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.results, second.results);
    assert_eq!(engine.latest_run().await.unwrap(), second);
}

/// Test: a failed audit write leaves the previous run readable and intact.
#[tokio::test]
async fn test_failed_write_keeps_previous_run() {
    let (store, fleet) = memory_fleet();
    fleet.hydrate(&["A"]).await;
    fleet.healthy("A").await;

    let engine = AuditEngine::new(fleet.store.clone(), fleet.shared_clock(), AuditConfig::default());
    let first = engine.run().await.unwrap();

    fleet.clock.advance(Duration::from_secs(60));
    store.fail_writes_to(keys::AUDIT_RESULTS);
    let err = engine.run().await.unwrap_err();
    assert!(matches!(
        err,
        VigilError::Storage(StorageError::InjectedFailure { .. })
    ));

    assert_eq!(engine.latest_run().await.unwrap(), first);
    assert!(first.result_for("A").unwrap().passed());
}

/// Test: a temp file abandoned mid-write (simulated crash) does not disturb
/// the stored run on the filesystem backend.
#[tokio::test]
async fn test_abandoned_temp_file_does_not_corrupt_fs_run() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn LedgerStore> = Arc::new(FsLedgerStore::new(dir.path()).unwrap());
    let fleet = Fleet::new(store.clone());
    fleet.hydrate(&["A", "B"]).await;
    fleet.healthy("A").await;

    let engine = AuditEngine::new(store.clone(), fleet.shared_clock(), AuditConfig::default());
    let first = engine.run().await.unwrap();

    // Half-written replacement left behind by a crashed writer.
    let mut tmp = NamedTempFile::new_in(dir.path()).unwrap();
    std::io::Write::write_all(&mut tmp, br#"{"run_id": "torn", "resu"#).unwrap();
    let (_file, _path) = tmp.keep().unwrap();

    assert_eq!(engine.latest_run().await.unwrap(), first);

    let reopened = FsLedgerStore::new(dir.path()).unwrap();
    let doc = reopened.get(keys::AUDIT_RESULTS).await.unwrap().unwrap();
    assert_eq!(doc["run_id"], first.run_id.as_str());
}

/// Test: strict mode folds exit codes into the verdict.
#[tokio::test]
async fn test_strict_non_zero_exit_fails() {
    let (_store, fleet) = memory_fleet();
    fleet.hydrate(&["A", "B"]).await;
    fleet.healthy("A").await;
    fleet.healthy("B").await;

    let runner = ScriptedRunner::new().with("B", Script::Exit(2));
    let run = AuditEngine::new(
        fleet.store.clone(),
        fleet.shared_clock(),
        AuditConfig::default().with_strict(true),
    )
    .with_runner(Arc::new(runner))
    .run()
    .await
    .unwrap();

    assert!(run.strict);
    let a = run.result_for("A").unwrap();
    assert_eq!(a.verdict, Verdict::Pass);
    assert_eq!(a.exit_code, Some(0));
    assert_eq!(a.stdout, "A ran");

    let b = run.result_for("B").unwrap();
    assert_eq!(b.verdict, Verdict::Fail);
    assert_eq!(b.exit_code, Some(2));
    assert_eq!(b.reason.as_deref(), Some("non_zero_exit"));
}

/// Test: a hanging agent is cut off at the timeout and fails with `timeout`;
/// the rest of the run completes.
#[tokio::test(start_paused = true)]
async fn test_strict_timeout_fails_agent_only() {
    let (_store, fleet) = memory_fleet();
    fleet.hydrate(&["slow", "quick"]).await;
    fleet.healthy("slow").await;
    fleet.healthy("quick").await;

    let runner = ScriptedRunner::new().with("slow", Script::Hang(Duration::from_secs(3600)));
    let run = AuditEngine::new(
        fleet.store.clone(),
        fleet.shared_clock(),
        AuditConfig::default()
            .with_strict(true)
            .with_agent_timeout(Duration::from_secs(1)),
    )
    .with_runner(Arc::new(runner))
    .run()
    .await
    .unwrap();

    let slow = run.result_for("slow").unwrap();
    assert_eq!(slow.verdict, Verdict::Fail);
    assert_eq!(slow.exit_code, None);
    assert_eq!(slow.reason.as_deref(), Some("timeout"));
    assert!(run.result_for("quick").unwrap().passed());
}

/// Test: runner errors become verdict data rather than aborting the run.
#[tokio::test]
async fn test_runner_error_is_recorded() {
    let (_store, fleet) = memory_fleet();
    fleet.hydrate(&["broken", "fine"]).await;
    fleet.healthy("broken").await;
    fleet.healthy("fine").await;

    let runner = ScriptedRunner::new().with("broken", Script::SpawnFails);
    let run = AuditEngine::new(
        fleet.store.clone(),
        fleet.shared_clock(),
        AuditConfig::default().with_strict(true),
    )
    .with_runner(Arc::new(runner))
    .run()
    .await
    .unwrap();

    let broken = run.result_for("broken").unwrap();
    assert_eq!(broken.reason.as_deref(), Some("runner_error"));
    assert!(broken.stderr.contains("no such file"));
    assert!(run.result_for("fine").unwrap().passed());
}

/// Test: no more than `max_concurrency` agents run at once, and results keep
/// registry order.
#[tokio::test(start_paused = true)]
async fn test_strict_pool_is_bounded() {
    let (_store, fleet) = memory_fleet();
    let names: Vec<String> = (0..10).map(|i| format!("agent-{i:02}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    fleet.hydrate(&refs).await;

    let runner = Arc::new(ScriptedRunner::new().with_delay(Duration::from_millis(50)));
    let run = AuditEngine::new(
        fleet.store.clone(),
        fleet.shared_clock(),
        AuditConfig::default().with_strict(true).with_max_concurrency(3),
    )
    .with_runner(runner.clone())
    .run()
    .await
    .unwrap();

    assert!(runner.peak_concurrency() <= 3);
    assert!(runner.peak_concurrency() >= 2);
    let order: Vec<&str> = run.results.iter().map(|r| r.agent.as_str()).collect();
    assert_eq!(order, refs);
}

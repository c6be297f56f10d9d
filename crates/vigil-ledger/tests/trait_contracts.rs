//! Trait contract tests for LedgerStore.
//!
//! Every backend runs the same checks: read-your-writes, whole-value replace,
//! array appends, serialized read-modify-write and the typed empty-state read.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use vigil_ledger::fakes::MemoryLedgerStore;
use vigil_ledger::{
    keys, read_or_default, FsLedgerStore, LedgerStore, StorageError, SurrealLedgerStore,
};

async fn put_then_get(store: &dyn LedgerStore) {
    store.put_atomic(keys::REGISTRY, json!({"version": 1})).await.unwrap();
    assert_eq!(
        store.get(keys::REGISTRY).await.unwrap(),
        Some(json!({"version": 1}))
    );

    store.put_atomic(keys::REGISTRY, json!({"version": 2})).await.unwrap();
    assert_eq!(
        store.get(keys::REGISTRY).await.unwrap(),
        Some(json!({"version": 2}))
    );
}

async fn missing_is_none(store: &dyn LedgerStore) {
    assert_eq!(store.get(keys::DRIFT_REPORT).await.unwrap(), None);
}

async fn append_builds_array(store: &dyn LedgerStore) {
    store.append_atomic(keys::INTENT_TRAIL, json!({"n": 1})).await.unwrap();
    store.append_atomic(keys::INTENT_TRAIL, json!({"n": 2})).await.unwrap();
    assert_eq!(
        store.get(keys::INTENT_TRAIL).await.unwrap(),
        Some(json!([{"n": 1}, {"n": 2}]))
    );
}

async fn update_sees_previous_value(store: &dyn LedgerStore) {
    store.put_atomic(keys::ECHO_PULSES, json!({"count": 1})).await.unwrap();
    let out = store
        .update_atomic(
            keys::ECHO_PULSES,
            Box::new(|current| {
                let n = current
                    .and_then(|v| v.get("count").and_then(Value::as_u64))
                    .unwrap_or(0);
                Ok(json!({"count": n + 1}))
            }),
        )
        .await
        .unwrap();
    assert_eq!(out, json!({"count": 2}));
    assert_eq!(
        store.get(keys::ECHO_PULSES).await.unwrap(),
        Some(json!({"count": 2}))
    );
}

async fn delete_removes(store: &dyn LedgerStore) {
    store.put_atomic(keys::SENTINEL_INCIDENT, json!({})).await.unwrap();
    store.delete(keys::SENTINEL_INCIDENT).await.unwrap();
    assert_eq!(store.get(keys::SENTINEL_INCIDENT).await.unwrap(), None);
    store.delete(keys::SENTINEL_INCIDENT).await.unwrap();
}

async fn typed_read_defaults(store: &dyn LedgerStore) {
    let empty: BTreeMap<String, u64> = read_or_default(store, keys::AUDIT_RESULTS).await.unwrap();
    assert!(empty.is_empty());

    store.put_atomic(keys::AUDIT_RESULTS, json!("not a map")).await.unwrap();
    let mismatched: BTreeMap<String, u64> =
        read_or_default(store, keys::AUDIT_RESULTS).await.unwrap();
    assert!(mismatched.is_empty());
}

async fn run_contract(store: &dyn LedgerStore) {
    put_then_get(store).await;
    missing_is_none(store).await;
    append_builds_array(store).await;
    update_sees_previous_value(store).await;
    delete_removes(store).await;
    typed_read_defaults(store).await;
}

// ===========================================================================
// Backends
// ===========================================================================

#[tokio::test]
async fn memory_store_satisfies_contract() {
    let store = MemoryLedgerStore::new();
    run_contract(&store).await;
}

#[tokio::test]
async fn fs_store_satisfies_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsLedgerStore::new(dir.path()).unwrap();
    run_contract(&store).await;
}

#[tokio::test]
async fn surreal_store_satisfies_contract() {
    let store = SurrealLedgerStore::in_memory()
        .await
        .expect("in_memory() failed");
    run_contract(&store).await;
}

// ===========================================================================
// Concurrency and failure
// ===========================================================================

#[tokio::test]
async fn concurrent_updates_do_not_lose_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsLedgerStore::new(dir.path()).unwrap());

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store
                .update_atomic(
                    keys::ECHO_PULSES,
                    Box::new(move |current| {
                        let mut map = match current {
                            Some(Value::Object(map)) => map,
                            _ => serde_json::Map::new(),
                        };
                        map.insert(format!("agent-{i}"), json!(i));
                        Ok(Value::Object(map))
                    }),
                )
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let doc = store.get(keys::ECHO_PULSES).await.unwrap().unwrap();
    assert_eq!(doc.as_object().unwrap().len(), 16);
}

#[tokio::test]
async fn corrupt_document_reads_as_default_but_io_errors_propagate() {
    let store = MemoryLedgerStore::new();
    store.corrupt(keys::REGISTRY);
    let value: BTreeMap<String, String> = read_or_default(&store, keys::REGISTRY).await.unwrap();
    assert!(value.is_empty());

    store.fail_writes_to(keys::REGISTRY);
    let err = store
        .put_atomic(keys::REGISTRY, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InjectedFailure { .. }));
}

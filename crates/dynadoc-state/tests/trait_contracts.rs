//! Trait contract tests for RunStore and ResultsStore.
//!
//! These tests verify the behavioral contracts of the storage traits using
//! the in-memory implementations. Any conforming implementation must pass
//! these.

use std::sync::Arc;

use dynadoc_odm::{DocumentId, FieldAccess, FieldDescriptor, SchemaRegistry, Value};
use dynadoc_state::storage_traits::*;
use dynadoc_state::{
    Collection, CollectionConfig, MemoryResultsStore, MemoryRunStore, StorageError,
};
use serde_json::json;

fn config() -> RunConfig {
    let mut config = RunConfig::new();
    config.insert("model".to_string(), json!("yolo-v5"));
    config.insert("iou".to_string(), json!(0.5));
    config
}

fn stages() -> Vec<String> {
    vec![
        json!({"_cls": "Match", "filter": {"tags": "validation"}}).to_string(),
        json!({"_cls": "Limit", "limit": 100}).to_string(),
    ]
}

fn results() -> RunResults {
    RunResults::new()
        .with_field("precision", 0.81)
        .unwrap()
        .with_field("recall", 0.74)
        .unwrap()
        .with_field("classes", vec!["cat", "dog"])
        .unwrap()
}

// ===========================================================================
// ResultsStore contract tests
// ===========================================================================

#[tokio::test]
async fn results_put_returns_digest_of_stored_bytes() {
    let store = MemoryResultsStore::new();
    let results = results();
    let reference = store.put(&results).await.unwrap();

    assert_eq!(
        reference.digest,
        ContentDigest::from_bytes(&results.to_bytes().unwrap())
    );
}

#[tokio::test]
async fn results_get_round_trip() {
    let store = MemoryResultsStore::new();
    let reference = store.put(&results()).await.unwrap();
    let loaded = store.get(&reference).await.unwrap();

    assert_eq!(loaded["precision"], Value::Float(0.81));
    assert_eq!(loaded["classes"], Value::from(vec!["cat", "dog"]));
}

#[tokio::test]
async fn results_get_not_found() {
    let store = MemoryResultsStore::new();
    let bogus = ResultsRef::new(ContentDigest::from_bytes(b"nothing"));
    let err = store.get(&bogus).await.unwrap_err();

    assert!(matches!(err, StorageError::ResultsNotFound { .. }));
}

#[tokio::test]
async fn results_each_put_gets_fresh_id() {
    let store = MemoryResultsStore::new();
    let a = store.put(&results()).await.unwrap();
    let b = store.put(&results()).await.unwrap();

    assert_ne!(a.id(), b.id());
    assert_eq!(a.document.document_type, RUN_RESULTS);
}

#[tokio::test]
async fn results_delete_noop_for_missing() {
    let store = MemoryResultsStore::new();
    store.delete(&DocumentId::new()).await.unwrap();
}

// ===========================================================================
// RunStore contract tests
// ===========================================================================

#[tokio::test]
async fn run_create_and_get() {
    let store = MemoryRunStore::new();
    let created = store.create_run("eval", config(), stages()).await.unwrap();
    let fetched = store.get_run("eval").await.unwrap();

    assert_eq!(created, fetched);
    assert!(fetched.is_pending());
    assert_eq!(fetched.key(), "eval");
    assert_eq!(fetched.config()["model"], json!("yolo-v5"));
    assert_eq!(fetched.view_stages(), stages());
    assert!(fetched.timestamp().is_some());
}

#[tokio::test]
async fn run_duplicate_key_rejected() {
    let store = MemoryRunStore::new();
    store.create_run("eval", config(), stages()).await.unwrap();
    let err = store
        .create_run("eval", RunConfig::new(), vec![])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        StorageError::DuplicateRunKey {
            key: "eval".to_string()
        }
    );
    assert_eq!(store.get_run("eval").await.unwrap().view_stages(), stages());
}

#[tokio::test]
async fn run_get_not_found() {
    let store = MemoryRunStore::new();
    let err = store.get_run("missing").await.unwrap_err();

    assert!(matches!(err, StorageError::RunNotFound { .. }));
}

#[tokio::test]
async fn run_attach_results_sets_reference() {
    let store = MemoryRunStore::new();
    store.create_run("eval", config(), stages()).await.unwrap();
    let reference = store.attach_results("eval", results()).await.unwrap();

    let run = store.get_run("eval").await.unwrap();
    assert!(!run.is_pending());
    assert_eq!(run.results(), Some(reference));

    let loaded = store.load_results("eval").await.unwrap();
    assert_eq!(loaded["recall"], Value::Float(0.74));
}

#[tokio::test]
async fn run_attach_results_twice_rejected() {
    let store = MemoryRunStore::new();
    store.create_run("eval", config(), stages()).await.unwrap();
    let first = store.attach_results("eval", results()).await.unwrap();

    let err = store
        .attach_results("eval", RunResults::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StorageError::ResultsAlreadyAttached {
            key: "eval".to_string()
        }
    );
    assert_eq!(store.get_run("eval").await.unwrap().results(), Some(first));
}

#[tokio::test]
async fn run_attach_results_requires_run() {
    let store = MemoryRunStore::new();
    let err = store
        .attach_results("missing", results())
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::RunNotFound { .. }));
}

#[tokio::test]
async fn run_load_results_while_pending() {
    let store = MemoryRunStore::new();
    store.create_run("eval", config(), stages()).await.unwrap();
    let err = store.load_results("eval").await.unwrap_err();

    assert!(matches!(err, StorageError::ResultsNotFound { .. }));
}

#[tokio::test]
async fn run_list_in_creation_order() {
    let store = MemoryRunStore::new();
    for key in ["b", "a", "c"] {
        store.create_run(key, RunConfig::new(), vec![]).await.unwrap();
    }
    store.attach_results("a", results()).await.unwrap();

    let keys: Vec<String> = store
        .list_runs()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.key().to_string())
        .collect();
    assert_eq!(keys, vec!["b", "a", "c"]);
}

#[tokio::test]
async fn run_list_does_not_read_results() {
    let blobs = Arc::new(MemoryResultsStore::new());
    let store = MemoryRunStore::with_results_store(blobs.clone());
    store.create_run("eval", config(), stages()).await.unwrap();
    let reference = store.attach_results("eval", results()).await.unwrap();

    // With the blob gone, listing still works and loading reports it.
    blobs.delete(reference.id()).await.unwrap();
    assert_eq!(store.list_runs().await.unwrap().len(), 1);
    assert!(matches!(
        store.load_results("eval").await,
        Err(StorageError::ResultsNotFound { .. })
    ));
}

#[tokio::test]
async fn run_delete_then_recreate() {
    let store = MemoryRunStore::new();
    store.create_run("eval", config(), stages()).await.unwrap();
    store.attach_results("eval", results()).await.unwrap();
    store.delete_run("eval").await.unwrap();

    assert!(store.list_runs().await.unwrap().is_empty());
    let again = store.create_run("eval", RunConfig::new(), vec![]).await.unwrap();
    assert!(again.is_pending());
    assert!(matches!(
        store.delete_run("missing").await,
        Err(StorageError::RunNotFound { .. })
    ));
}

#[tokio::test]
async fn run_record_serde_round_trip() {
    let store = MemoryRunStore::new();
    store.create_run("eval", config(), stages()).await.unwrap();
    store.attach_results("eval", results()).await.unwrap();
    let run = store.get_run("eval").await.unwrap();

    let json = serde_json::to_string(&run).unwrap();
    let back: RunRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, run);
}

#[tokio::test]
async fn run_record_is_a_run_document() {
    let store = MemoryRunStore::new();
    store.create_run("eval", config(), stages()).await.unwrap();
    let pending = store.get_run("eval").await.unwrap();
    let document = pending.document();

    assert_eq!(document.document_type().name(), RUN);
    assert!(document["results"].is_null());
    assert_eq!(
        document.field_schema().lookup("results"),
        Some(&FieldDescriptor::reference(RUN_RESULTS))
    );
    assert_eq!(
        document.field_schema().lookup("view_stages"),
        Some(&FieldDescriptor::list(FieldDescriptor::String))
    );

    let reference = store.attach_results("eval", results()).await.unwrap();
    let run = store.get_run("eval").await.unwrap();
    let stored = run.document()["results"].as_reference().unwrap();
    assert_eq!(stored, &reference.document);
    assert_eq!(stored.document_type, RUN_RESULTS);
}

#[test]
fn run_record_results_are_set_once() {
    let mut run = RunRecord::new("eval", RunConfig::new(), vec![]).unwrap();
    let first = ResultsRef::new(ContentDigest::from_bytes(b"first"));
    run.set_results(&first).unwrap();

    let err = run
        .set_results(&ResultsRef::new(ContentDigest::from_bytes(b"second")))
        .unwrap_err();
    assert_eq!(
        err,
        StorageError::ResultsAlreadyAttached {
            key: "eval".to_string()
        }
    );
    assert_eq!(run.results(), Some(first));
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_create_same_key_has_one_winner() {
    let store = Arc::new(MemoryRunStore::new());
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.create_run("race", RunConfig::new(), vec![]).await })
        })
        .collect();

    let outcomes = futures::future::join_all(tasks).await;
    let wins = outcomes
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(wins, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attach_has_one_winner_and_no_orphans() {
    let blobs = Arc::new(MemoryResultsStore::new());
    let store = Arc::new(MemoryRunStore::with_results_store(blobs.clone()));
    store.create_run("race", RunConfig::new(), vec![]).await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let results = RunResults::new().with_field("attempt", i).unwrap();
                store.attach_results("race", results).await
            })
        })
        .collect();

    let outcomes = futures::future::join_all(tasks).await;
    let wins = outcomes
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(wins, 1);
    assert_eq!(blobs.len(), 1);

    let loaded = store.load_results("race").await.unwrap();
    assert!(loaded.has_field("attempt"));
}

// ===========================================================================
// Collection wiring
// ===========================================================================

#[tokio::test]
async fn collection_exposes_its_run_store() {
    let registry = Arc::new(SchemaRegistry::with_builtins());
    let dataset = Collection::new(CollectionConfig::new("runs"), registry).unwrap();

    dataset
        .runs()
        .create_run("eval", config(), stages())
        .await
        .unwrap();
    dataset
        .runs()
        .attach_results("eval", results())
        .await
        .unwrap();

    let runs = dataset.runs().list_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].is_pending());
}

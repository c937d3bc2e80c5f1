//! Contract tests shared by every store implementation.

use super::*;
use crate::lock::{Lock, LockKey, LockState};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn doc(value: Value) -> Document {
    value.as_object().unwrap().clone()
}

async fn seed(store: &dyn DocumentStore) {
    for (id, n) in [("a", 1), ("b", 2), ("c", 3)] {
        store
            .insert(doc(json!({"_id": id, "n": n, "group": "x"})))
            .await
            .unwrap();
    }
}

async fn check_insert_and_find(store: &dyn DocumentStore) {
    seed(store).await;

    let a = store.find_one("a").await.unwrap().unwrap();
    assert_eq!(a["n"], 1);
    assert!(store.find_one("missing").await.unwrap().is_none());

    let err = store.insert(doc(json!({"_id": "a"}))).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));

    let all = store.find(&Filter::All).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|d| document_id(d).unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let twos = store.find(&Filter::eq("n", 2)).await.unwrap();
    assert_eq!(twos.len(), 1);
}

async fn check_conditional_update(store: &dyn DocumentStore) {
    seed(store).await;

    let prior = store
        .conditional_update(
            &Filter::id("b").and(Filter::eq("n", 2)),
            &Update::new().set("n", 20),
        )
        .await
        .unwrap()
        .unwrap();
    // The prior value is returned, the new one is stored
    assert_eq!(prior["n"], 2);
    assert_eq!(store.find_one("b").await.unwrap().unwrap()["n"], 20);

    // The filter no longer matches
    let none = store
        .conditional_update(
            &Filter::id("b").and(Filter::eq("n", 2)),
            &Update::new().set("n", 30),
        )
        .await
        .unwrap();
    assert!(none.is_none());
    assert_eq!(store.find_one("b").await.unwrap().unwrap()["n"], 20);
}

async fn check_conditional_replace_and_delete(store: &dyn DocumentStore) {
    seed(store).await;

    let prior = store
        .conditional_replace(&Filter::id("a"), doc(json!({"_id": "a", "fresh": true})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prior["n"], 1);
    let now = store.find_one("a").await.unwrap().unwrap();
    assert_eq!(now.get("n"), None);
    assert_eq!(now["fresh"], true);

    let err = store
        .conditional_replace(&Filter::id("a"), doc(json!({"_id": "zzz"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DocLockError::UserError(_)));

    let deleted = store
        .conditional_delete(&Filter::id("c"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deleted["n"], 3);
    assert!(store.find_one("c").await.unwrap().is_none());
    assert!(
        store
            .conditional_delete(&Filter::id("c"))
            .await
            .unwrap()
            .is_none()
    );
}

async fn check_bulk(store: &dyn DocumentStore) {
    seed(store).await;

    let touched = store
        .update_many(&Filter::eq("group", "x"), &Update::new().inc("n", 10))
        .await
        .unwrap();
    assert_eq!(touched, 3);
    assert_eq!(store.find_one("a").await.unwrap().unwrap()["n"], 11);

    let removed = store
        .delete_many(&Filter::Or(vec![Filter::id("a"), Filter::id("b")]))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.find(&Filter::All).await.unwrap().len(), 1);
}

async fn check_lock_state_filters(store: &dyn DocumentStore) {
    let now = Utc::now();
    let active = Lock::new(now, Duration::minutes(5), Some("w".to_string())).unwrap();
    let expired = Lock::new(now - Duration::minutes(10), Duration::minutes(1), None).unwrap();

    store.insert(doc(json!({"_id": "free"}))).await.unwrap();
    store
        .insert(doc(json!({"_id": "held", "lock": active})))
        .await
        .unwrap();
    store
        .insert(doc(json!({"_id": "lapsed", "lock": expired})))
        .await
        .unwrap();

    let acquirable = store.find(&Filter::acquirable(now)).await.unwrap();
    let ids: Vec<&str> = acquirable.iter().map(|d| document_id(d).unwrap()).collect();
    assert_eq!(ids, vec!["free", "lapsed"]);

    let held = store
        .find(&Filter::lock_state(&[LockState::Active], now))
        .await
        .unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(
        document_lock(&held[0]).unwrap().unwrap().lock_key,
        active.lock_key
    );

    let by_key = store
        .conditional_update(&Filter::LockKey(LockKey::new()), &Update::new().set("x", 1))
        .await
        .unwrap();
    assert!(by_key.is_none());
}

#[tokio::test]
async fn memory_store_insert_and_find() {
    check_insert_and_find(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_conditional_update() {
    check_conditional_update(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_replace_and_delete() {
    check_conditional_replace_and_delete(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_bulk() {
    check_bulk(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_lock_state_filters() {
    check_lock_state_filters(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_failed_bulk_update_changes_nothing() {
    let store = MemoryStore::new();
    store
        .insert(doc(json!({"_id": "a", "n": 1})))
        .await
        .unwrap();
    store
        .insert(doc(json!({"_id": "b", "n": "text"})))
        .await
        .unwrap();

    let result = store
        .update_many(&Filter::All, &Update::new().inc("n", 1))
        .await;
    assert!(result.is_err());
    assert_eq!(store.find_one("a").await.unwrap().unwrap()["n"], 1);
}

fn file_store() -> (TempDir, FileStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path(), "docs").unwrap();
    (temp_dir, store)
}

#[tokio::test]
async fn file_store_insert_and_find() {
    let (_temp_dir, store) = file_store();
    check_insert_and_find(&store).await;
}

#[tokio::test]
async fn file_store_conditional_update() {
    let (_temp_dir, store) = file_store();
    check_conditional_update(&store).await;
}

#[tokio::test]
async fn file_store_replace_and_delete() {
    let (_temp_dir, store) = file_store();
    check_conditional_replace_and_delete(&store).await;
}

#[tokio::test]
async fn file_store_bulk() {
    let (_temp_dir, store) = file_store();
    check_bulk(&store).await;
}

#[tokio::test]
async fn file_store_lock_state_filters() {
    let (_temp_dir, store) = file_store();
    check_lock_state_filters(&store).await;
}

#[tokio::test]
async fn file_store_documents_survive_reopen() {
    let (temp_dir, store) = file_store();
    store
        .insert(doc(json!({"_id": "order/1", "total": 9})))
        .await
        .unwrap();
    drop(store);

    let reopened = FileStore::open(temp_dir.path(), "docs").unwrap();
    let found = reopened.find_one("order/1").await.unwrap().unwrap();
    assert_eq!(found["total"], 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_store_conditional_update_has_a_single_winner() {
    let (_temp_dir, store) = file_store();
    store
        .insert(doc(json!({"_id": "race", "owner": null})))
        .await
        .unwrap();

    // Separate handles, as separate processes would have
    let mut tasks = Vec::new();
    for worker in 0..8 {
        let handle: Arc<dyn DocumentStore> =
            Arc::new(FileStore::open(store.dir().parent().unwrap(), "docs").unwrap());
        tasks.push(tokio::spawn(async move {
            handle
                .conditional_update(
                    &Filter::id("race").and(Filter::eq("owner", Value::Null)),
                    &Update::new().set("owner", worker),
                )
                .await
                .unwrap()
                .is_some()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

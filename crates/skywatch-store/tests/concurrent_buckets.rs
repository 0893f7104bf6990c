//! Integration tests for the cache and store under concurrent access.

use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use skywatch_protocol::{DroneId, FlightSession, SessionState};
use skywatch_store::{FileStore, HistoryCache, resolve_bucket};
use tempfile::TempDir;

// =========================================================================
// Helpers
// =========================================================================

fn session(id: &str, offset_secs: i64) -> FlightSession {
    let created = Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap() + TimeDelta::seconds(offset_secs);
    FlightSession::new(DroneId::new(id), created, SessionState::Live)
}

// =========================================================================
// Per-bucket serialization
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_append_and_write_keeps_every_session() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(HistoryCache::new(FileStore::new(dir.path())));
    let filename = resolve_bucket(session("x", 0).created_time).filename;

    let mut tasks = Vec::new();
    for n in 0..24 {
        let cache = Arc::clone(&cache);
        let filename = filename.clone();
        tasks.push(tokio::spawn(async move {
            let shared = cache.get(&filename).await.unwrap();
            let mut sessions = shared.lock().await;
            sessions.push(session(&format!("D{n}"), n));
            cache.write_locked(&filename, &sessions).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let on_disk = FileStore::new(dir.path()).load(&filename).await.unwrap();
    assert_eq!(on_disk.len(), 24);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_loads_one_shared_bucket() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path());
    let filename = resolve_bucket(session("x", 0).created_time).filename;
    store.save(&filename, &[session("seed", 0)]).await.unwrap();
    let cache = Arc::new(HistoryCache::new(store));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let filename = filename.clone();
        tasks.push(tokio::spawn(async move { cache.get(&filename).await.unwrap() }));
    }
    let mut buckets = Vec::new();
    for task in tasks {
        buckets.push(task.await.unwrap());
    }

    assert!(buckets.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(buckets[0].lock().await.len(), 1);
    assert_eq!(cache.filenames().await.len(), 1);
}

// =========================================================================
// Independent weeks
// =========================================================================

#[tokio::test]
async fn test_different_weeks_are_independent_files() {
    let dir = TempDir::new().unwrap();
    let cache = HistoryCache::new(FileStore::new(dir.path()));
    let this_week = resolve_bucket(session("a", 0).created_time).filename;
    let next_week = resolve_bucket(session("b", 7 * 86_400).created_time).filename;
    assert_ne!(this_week, next_week);

    cache.get(&this_week).await.unwrap().lock().await.push(session("a", 0));
    cache
        .get(&next_week)
        .await
        .unwrap()
        .lock()
        .await
        .push(session("b", 7 * 86_400));
    assert_eq!(cache.flush_all().await.unwrap(), 2);

    let listed: Vec<String> = cache
        .store()
        .list_buckets()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.filename)
        .collect();
    assert_eq!(listed, vec![this_week, next_week]);
}

//! Integration tests for the SQLite-backed persistent backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flex_cache::{BackendKind, CacheError, Codec, FlexCache, Settings};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::json;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> FlexCache {
    FlexCache::persistent(Some(dir.path()), "rc", Codec::json())
        .await
        .unwrap()
}

fn counted(
    counter: Arc<AtomicUsize>,
) -> impl Fn(u32) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync + 'static {
    move |value| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(format!("value-{}", value))
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_results_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let cache = open(&dir).await;
        assert_eq!(cache.kind(), BackendKind::Persistent);
        let memo = cache
            .cache(0, 0, Some("disk"))
            .unwrap()
            .wrap(counted(Arc::clone(&counter)))
            .unwrap();
        assert_eq!(memo.call(1).await.unwrap(), "value-1");
    }

    let cache = open(&dir).await;
    let memo = cache
        .cache(0, 0, Some("disk"))
        .unwrap()
        .wrap(counted(Arc::clone(&counter)))
        .unwrap();
    assert_eq!(memo.call(1).await.unwrap(), "value-1");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_limit_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let result = open(&dir).await.cache(0, 3, Some("disk"));
    assert!(matches!(result, Err(CacheError::Config(_))));
}

#[tokio::test]
async fn test_ttl_expiry() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;

    cache.set("short", &json!({"a": 1}), 1, 0, None).await.unwrap();
    assert!(cache
        .get::<serde_json::Value>("short", None)
        .await
        .unwrap()
        .is_some());

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(cache
        .get::<serde_json::Value>("short", None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_huge_ttl_is_kept() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;

    cache.set("forever", &1, u64::MAX, 0, None).await.unwrap();
    cache.set("decades", &2, 10_000_000_000_000_000, 0, None).await.unwrap();

    assert_eq!(cache.get::<u32>("forever", None).await.unwrap(), Some(1));
    assert_eq!(cache.get::<u32>("decades", None).await.unwrap(), Some(2));

    // The connection is still usable afterwards
    cache.set("after", &3, 0, 0, None).await.unwrap();
    assert_eq!(cache.get::<u32>("after", None).await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_invalidation() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;
    let counter = Arc::new(AtomicUsize::new(0));
    let memo = cache
        .cache(0, 0, Some("disk"))
        .unwrap()
        .wrap(counted(Arc::clone(&counter)))
        .unwrap();

    memo.invalidate(&7).await.unwrap();
    memo.call(7).await.unwrap();
    memo.call(8).await.unwrap();
    memo.invalidate(&7).await.unwrap();
    memo.call(7).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    memo.invalidate_all().await.unwrap();
    memo.call(8).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_mget_refills_misses() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;
    let counter = Arc::new(AtomicUsize::new(0));
    let memo = cache
        .cache(0, 0, Some("disk"))
        .unwrap()
        .wrap(counted(Arc::clone(&counter)))
        .unwrap();

    memo.call(2).await.unwrap();

    let results = cache
        .mget(vec![memo.bind(1), memo.bind(2), memo.bind(3)])
        .await
        .unwrap();
    assert_eq!(results, vec![json!("value-1"), json!("value-2"), json!("value-3")]);
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    memo.call(1).await.unwrap();
    memo.call(3).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_from_settings_uses_directory() {
    let dir = TempDir::new().unwrap();
    let settings = Settings {
        backend: BackendKind::Persistent,
        disk_directory: Some(dir.path().join("nested")),
        ..Settings::default()
    };

    let cache = FlexCache::from_settings(&settings).await.unwrap();
    cache.set("k", &1, 0, 0, None).await.unwrap();

    assert!(dir.path().join("nested").join("flex_cache.sqlite3").exists());
}

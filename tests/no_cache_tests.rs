//! Integration tests for the disabled backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flex_cache::{BackendKind, CacheError, FlexCache, Settings};
use futures_util::future::{BoxFuture, FutureExt};

fn counted(
    counter: Arc<AtomicUsize>,
) -> impl Fn(u32) -> BoxFuture<'static, anyhow::Result<u32>> + Send + Sync + 'static {
    move |value| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(value + 100)
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_every_call_recomputes() {
    let counter = Arc::new(AtomicUsize::new(0));
    let memo = FlexCache::disabled()
        .cache(60, 5, Some("noop"))
        .unwrap()
        .wrap(counted(Arc::clone(&counter)))
        .unwrap();

    for _ in 0..3 {
        assert_eq!(memo.call(1).await.unwrap(), 101);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalidation_is_a_noop() {
    let cache = FlexCache::disabled();
    let memo = cache
        .cache(0, 0, Some("noop"))
        .unwrap()
        .wrap(counted(Arc::new(AtomicUsize::new(0))))
        .unwrap();

    memo.invalidate(&1).await.unwrap();
    memo.invalidate_all().await.unwrap();
    cache.invalidate("anything", None).await.unwrap();
}

#[tokio::test]
async fn test_mget_is_unsupported() {
    let cache = FlexCache::disabled();
    let memo = cache
        .cache(0, 0, Some("noop"))
        .unwrap()
        .wrap(counted(Arc::new(AtomicUsize::new(0))))
        .unwrap();

    let result = cache.mget(vec![memo.bind(1)]).await;
    assert!(matches!(result, Err(CacheError::Unsupported(_))));
}

#[tokio::test]
async fn test_set_is_discarded() {
    let cache = FlexCache::disabled();
    cache.set("k", &1, 0, 0, None).await.unwrap();
    assert!(cache.get::<u32>("k", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_from_settings_disabled() {
    let settings = Settings {
        backend: BackendKind::Disabled,
        ..Settings::default()
    };
    let cache = FlexCache::from_settings(&settings).await.unwrap();
    assert_eq!(cache.kind(), BackendKind::Disabled);
}

#[tokio::test]
async fn test_from_settings_unknown_codec() {
    let settings = Settings {
        backend: BackendKind::Disabled,
        serializer: "pickle.dumps".to_string(),
        ..Settings::default()
    };
    let result = FlexCache::from_settings(&settings).await;
    assert!(matches!(result, Err(CacheError::UnknownCodec(_))));
}

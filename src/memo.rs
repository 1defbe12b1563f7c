//! Memoization Module
//!
//! `Decorator` holds a validated caching policy; `Decorator::wrap` turns an
//! async computation into a `Memoized` handle that consults the backend before
//! running it.
//!
//! # Example
//! ```ignore
//! async fn area(dims: (u32, u32)) -> anyhow::Result<u32> {
//!     Ok(dims.0 * dims.1)
//! }
//!
//! let cache = FlexCache::in_process("rc", Codec::json())?;
//! let area = cache.cache(60, 0, None)?.wrap(area)?;
//! assert_eq!(area.call((3, 4)).await?, 12);
//! area.invalidate(&(3, 4)).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{Backend, BackendKind, WriteRequest};
use crate::cache::StatsRecorder;
use crate::codec::{Codec, Payload};
use crate::error::{CacheError, Result};
use crate::facade::FlexCache;
use crate::keys::{call_key, function_namespace, index_key};

type ComputeFn<A, R> = dyn Fn(A) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync;

// == Decorator ==
/// A caching policy bound to a facade, ready to wrap computations.
#[derive(Debug, Clone)]
pub struct Decorator {
    cache: FlexCache,
    ttl: u64,
    limit: u64,
    namespace: Option<String>,
}

impl Decorator {
    /// Limit and namespace are validated by `FlexCache::cache`.
    pub(crate) fn new(cache: FlexCache, ttl: u64, limit: u64, namespace: Option<String>) -> Self {
        Self {
            cache,
            ttl,
            limit,
            namespace,
        }
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Wraps a computation.
    ///
    /// Without an explicit namespace the function item's path is used, so
    /// closures must be given one.
    pub fn wrap<A, R, F, Fut>(&self, func: F) -> Result<Memoized<A, R>>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        A: Serialize + Send + 'static,
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        let namespace = match &self.namespace {
            Some(namespace) => namespace.clone(),
            None => function_namespace::<F>()?,
        };

        let state = DecoratorState {
            backend: self.cache.backend(),
            codec: self.cache.codec().clone(),
            prefix: self.cache.prefix().to_string(),
            index_key: index_key(self.cache.prefix(), &namespace),
            namespace,
            ttl: self.ttl,
            limit: self.limit,
            stats: self.cache.recorder(),
        };
        debug!(namespace = %state.namespace, ttl = state.ttl, limit = state.limit, "wrapped computation");

        let func: Arc<ComputeFn<A, R>> = Arc::new(move |args: A| {
            let fut: BoxFuture<'static, anyhow::Result<R>> = Box::pin(func(args));
            fut
        });

        Ok(Memoized {
            state: Arc::new(state),
            func,
        })
    }
}

// == Decorator State ==
/// Everything a wrapped computation needs to build keys and talk to storage.
pub struct DecoratorState {
    backend: Arc<dyn Backend>,
    codec: Codec,
    prefix: String,
    namespace: String,
    index_key: String,
    ttl: u64,
    limit: u64,
    stats: Arc<StatsRecorder>,
}

impl DecoratorState {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Data key for one set of arguments.
    pub fn key_for<A: Serialize + ?Sized>(&self, args: &A) -> Result<String> {
        call_key(&self.codec, &self.prefix, &self.namespace, args)
    }

    pub(crate) fn write_request(&self, key: String, payload: Payload) -> WriteRequest {
        WriteRequest {
            key,
            index_key: self.index_key.clone(),
            payload,
            ttl: self.ttl,
            limit: self.limit,
        }
    }
}

impl fmt::Debug for DecoratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorState")
            .field("backend", &self.backend.kind())
            .field("codec", &self.codec)
            .field("prefix", &self.prefix)
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("limit", &self.limit)
            .finish()
    }
}

// == Memoized ==
/// A computation wrapped with caching.
pub struct Memoized<A, R> {
    state: Arc<DecoratorState>,
    func: Arc<ComputeFn<A, R>>,
}

impl<A, R> Clone for Memoized<A, R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            func: Arc::clone(&self.func),
        }
    }
}

impl<A, R> fmt::Debug for Memoized<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("state", &self.state)
            .finish()
    }
}

impl<A, R> Memoized<A, R>
where
    A: Serialize + Send + 'static,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    /// Returns the cached result for `args`, computing and storing it on a miss.
    ///
    /// # Errors
    ///
    /// Backend errors propagate as-is. A failing computation surfaces as
    /// `CacheError::Computation` and nothing is stored.
    pub async fn call(&self, args: A) -> Result<R> {
        let state = &self.state;
        if state.backend.kind() == BackendKind::Disabled {
            return self.call_uncached(args).await;
        }

        let key = state.key_for(&args)?;
        if let Some(payload) = state.backend.check(&key).await? {
            state.stats.record_hit();
            debug!(key = %key, "cache hit");
            return state.codec.decode(&payload);
        }

        state.stats.record_miss();
        debug!(key = %key, "cache miss");

        let result = self.call_uncached(args).await?;
        let payload = state.codec.encode(&result)?;
        state.backend.store(state.write_request(key, payload)).await?;
        state.stats.record_stores(1);
        Ok(result)
    }

    /// Runs the underlying computation without touching the cache.
    pub async fn call_uncached(&self, args: A) -> Result<R> {
        (self.func)(args).await.map_err(CacheError::Computation)
    }

    /// Data key `call(args)` would use.
    pub fn key(&self, args: &A) -> Result<String> {
        self.state.key_for(args)
    }

    /// Removes the cached result for `args`. Succeeds when nothing is cached.
    pub async fn invalidate(&self, args: &A) -> Result<()> {
        let key = self.state.key_for(args)?;
        self.state
            .backend
            .invalidate(&key, &self.state.index_key)
            .await?;
        self.state.stats.record_invalidation();
        debug!(key = %key, "invalidated");
        Ok(())
    }

    /// Removes every cached result of this computation's namespace.
    pub async fn invalidate_all(&self) -> Result<()> {
        self.state
            .backend
            .invalidate_namespace(&self.state.prefix, &self.state.namespace)
            .await?;
        self.state.stats.record_invalidation();
        Ok(())
    }

    pub fn state(&self) -> &DecoratorState {
        &self.state
    }

    /// Pairs this computation with arguments for `FlexCache::mget`.
    pub fn bind(&self, args: A) -> Call {
        Call {
            inner: Box::new(BoundCall {
                state: Arc::clone(&self.state),
                func: Arc::clone(&self.func),
                args,
            }),
        }
    }
}

// == Batched Calls ==
trait BatchCall: Send {
    fn state(&self) -> &Arc<DecoratorState>;

    fn key(&self) -> Result<String>;

    fn compute(self: Box<Self>) -> BoxFuture<'static, Result<Value>>;
}

struct BoundCall<A, R> {
    state: Arc<DecoratorState>,
    func: Arc<ComputeFn<A, R>>,
    args: A,
}

impl<A, R> BatchCall for BoundCall<A, R>
where
    A: Serialize + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn state(&self) -> &Arc<DecoratorState> {
        &self.state
    }

    fn key(&self) -> Result<String> {
        self.state.key_for(&self.args)
    }

    fn compute(self: Box<Self>) -> BoxFuture<'static, Result<Value>> {
        let BoundCall { func, args, .. } = *self;
        Box::pin(async move {
            let result = func(args).await.map_err(CacheError::Computation)?;
            Ok(serde_json::to_value(&result)?)
        })
    }
}

/// A wrapped computation bound to its arguments, with the result type erased.
pub struct Call {
    inner: Box<dyn BatchCall>,
}

impl Call {
    pub fn key(&self) -> Result<String> {
        self.inner.key()
    }

    pub fn state(&self) -> &DecoratorState {
        self.inner.state()
    }

    /// Runs the computation, bypassing the cache.
    pub(crate) async fn compute(self) -> Result<Value> {
        self.inner.compute().await
    }

    /// Computes a missing result and prepares the write that caches it.
    pub(crate) async fn refill(self, key: String) -> Result<(Value, WriteRequest)> {
        let state = Arc::clone(self.inner.state());
        let value = self.compute().await?;
        let payload = state.codec.serialize(&value)?;
        Ok((value, state.write_request(key, payload)))
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("namespace", &self.state().namespace())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn double(value: u32) -> anyhow::Result<u32> {
        Ok(value * 2)
    }

    fn counting(
        counter: Arc<AtomicUsize>,
    ) -> impl Fn(u32) -> BoxFuture<'static, anyhow::Result<u32>> + Send + Sync + 'static {
        move |value| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(value + 1)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_namespace_from_function_path() {
        let cache = FlexCache::in_process("rc", Codec::json()).unwrap();
        let memo = cache.cache(0, 0, None).unwrap().wrap(double).unwrap();

        assert!(memo.state().namespace().ends_with("memo.tests.double"));
        assert_eq!(memo.call(4).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_closure_needs_namespace() {
        let cache = FlexCache::in_process("rc", Codec::json()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let result = cache.cache(0, 0, None).unwrap().wrap(counting(counter));
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_second_call_is_a_hit() {
        let cache = FlexCache::in_process("rc", Codec::json()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let memo = cache
            .cache(0, 0, Some("inc"))
            .unwrap()
            .wrap(counting(Arc::clone(&counter)))
            .unwrap();

        assert_eq!(memo.call(1).await.unwrap(), 2);
        assert_eq!(memo.call(1).await.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_failed_computation_is_not_stored() {
        let cache = FlexCache::in_process("rc", Codec::json()).unwrap();
        let memo = cache
            .cache(0, 0, Some("failing"))
            .unwrap()
            .wrap(|_: u32| async { Err::<u32, _>(anyhow::anyhow!("boom")) })
            .unwrap();

        let result = memo.call(1).await;
        assert!(matches!(result, Err(CacheError::Computation(_))));
        assert_eq!(cache.stats().stores, 0);
    }

    #[tokio::test]
    async fn test_key_matches_state() {
        let cache = FlexCache::in_process("rc", Codec::json()).unwrap();
        let memo = cache.cache(0, 0, Some("ns")).unwrap().wrap(double).unwrap();

        assert_eq!(memo.key(&3).unwrap(), "rc:ns:[[3],{}]");
        assert_eq!(memo.state().index_key(), "rc:ns:keys");
    }

    #[tokio::test]
    async fn test_bound_call_keeps_key() {
        let cache = FlexCache::in_process("rc", Codec::json()).unwrap();
        let memo = cache.cache(0, 0, Some("ns")).unwrap().wrap(double).unwrap();

        let call = memo.bind(5);
        assert_eq!(call.key().unwrap(), memo.key(&5).unwrap());
        assert_eq!(call.compute().await.unwrap(), serde_json::json!(10));
    }
}

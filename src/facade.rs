//! Cache Facade
//!
//! `FlexCache` is the long-lived handle applications hold: it owns the backend
//! chosen at construction, the key prefix, the codec and the statistics, and
//! hands out decorators bound to all of them.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{
    Backend, BackendKind, DisabledBackend, MemoryBackend, PersistentBackend, RedisBackend,
    WriteRequest,
};
use crate::cache::{CacheStats, StatsRecorder, DEFAULT_PRUNE_THRESHOLD};
use crate::codec::Codec;
use crate::config::Settings;
use crate::error::{CacheError, Result};
use crate::keys::{
    data_key, index_key, validate_namespace, validate_prefix, DEFAULT_NAMESPACE, INDEX_SUFFIX,
};
use crate::memo::{Call, Decorator};

// == Flex Cache ==
/// Cheaply cloneable cache handle.
#[derive(Clone)]
pub struct FlexCache {
    backend: Arc<dyn Backend>,
    prefix: Arc<str>,
    codec: Codec,
    stats: Arc<StatsRecorder>,
}

impl FlexCache {
    /// Wraps an already built backend.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Config` when `prefix` is empty or contains `:`.
    pub fn new(backend: Arc<dyn Backend>, prefix: &str, codec: Codec) -> Result<Self> {
        validate_prefix(prefix)?;
        Ok(Self::build(backend, prefix, codec))
    }

    fn build(backend: Arc<dyn Backend>, prefix: &str, codec: Codec) -> Self {
        Self {
            backend,
            prefix: Arc::from(prefix),
            codec,
            stats: Arc::new(StatsRecorder::new()),
        }
    }

    /// In-process cache with the default sweep interval.
    pub fn in_process(prefix: &str, codec: Codec) -> Result<Self> {
        Self::in_process_with_threshold(prefix, codec, DEFAULT_PRUNE_THRESHOLD)
    }

    pub fn in_process_with_threshold(
        prefix: &str,
        codec: Codec,
        prune_threshold: usize,
    ) -> Result<Self> {
        Self::new(
            Arc::new(MemoryBackend::with_prune_threshold(prune_threshold)),
            prefix,
            codec,
        )
    }

    /// Cache that never stores anything.
    pub fn disabled() -> Self {
        Self::build(Arc::new(DisabledBackend), "rc", Codec::json())
    }

    /// Remote cache on Redis.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if Redis cannot be reached.
    pub async fn redis(url: &str, prefix: &str, codec: Codec) -> Result<Self> {
        validate_prefix(prefix)?;
        let backend = RedisBackend::connect(url).await?;
        Self::new(Arc::new(backend), prefix, codec)
    }

    /// Persistent cache in `directory`, or the temp directory when None.
    pub async fn persistent(directory: Option<&Path>, prefix: &str, codec: Codec) -> Result<Self> {
        validate_prefix(prefix)?;
        let backend = PersistentBackend::open(directory).await?;
        Self::new(Arc::new(backend), prefix, codec)
    }

    /// Builds the cache described by `settings`.
    ///
    /// # Errors
    ///
    /// - `CacheError::Config` for invalid settings
    /// - `CacheError::UnknownCodec` when a codec name cannot be resolved
    /// - Connection errors from the selected backend
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let codec = Codec::resolve(&settings.serializer, &settings.deserializer)?;

        let backend: Arc<dyn Backend> = match settings.backend {
            BackendKind::InProcess => {
                Arc::new(MemoryBackend::with_prune_threshold(settings.prune_threshold))
            }
            BackendKind::Remote => Arc::new(
                RedisBackend::connect_with_batch_size(
                    &settings.redis_url,
                    settings.scan_batch_size,
                )
                .await?,
            ),
            BackendKind::Persistent => {
                Arc::new(PersistentBackend::open(settings.disk_directory.as_deref()).await?)
            }
            BackendKind::Disabled => Arc::new(DisabledBackend),
        };

        info!(
            backend = %settings.backend,
            prefix = %settings.prefix,
            codec = %codec.name(),
            "cache initialized"
        );
        Self::new(backend, &settings.prefix, codec)
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub(crate) fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub(crate) fn recorder(&self) -> Arc<StatsRecorder> {
        Arc::clone(&self.stats)
    }

    // == Decorators ==
    /// Creates a caching policy for wrapping computations.
    ///
    /// # Arguments
    ///
    /// * `ttl` - Seconds a result stays valid, 0 = forever
    /// * `limit` - Maximum cached results in the namespace, 0 = unbounded
    /// * `namespace` - Explicit namespace; derived from the function path when None
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Config` when the backend cannot enforce `limit` or
    /// the namespace is invalid.
    pub fn cache(&self, ttl: u64, limit: u64, namespace: Option<&str>) -> Result<Decorator> {
        self.check_limit(limit)?;
        if let Some(namespace) = namespace {
            validate_namespace(namespace)?;
        }
        Ok(Decorator::new(
            self.clone(),
            ttl,
            limit,
            namespace.map(str::to_string),
        ))
    }

    fn check_limit(&self, limit: u64) -> Result<()> {
        if limit != 0 && !self.backend.supports_limit() {
            return Err(CacheError::Config(format!(
                "{} cache does not support limits, only ttl",
                self.kind()
            )));
        }
        Ok(())
    }

    fn facade_keys(&self, key: &str, namespace: Option<&str>) -> Result<(String, String)> {
        if key.is_empty() || key == INDEX_SUFFIX {
            return Err(CacheError::InvalidKey(format!(
                "'{}' cannot be used as a cache key",
                key
            )));
        }
        let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE);
        validate_namespace(namespace)?;
        Ok((
            data_key(&self.prefix, namespace, key),
            index_key(&self.prefix, namespace),
        ))
    }

    // == Direct Access ==
    /// Reads a value stored with `set`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> Result<Option<T>> {
        let (key, _) = self.facade_keys(key, namespace)?;
        match self.backend.check(&key).await? {
            Some(payload) => {
                self.stats.record_hit();
                debug!(key = %key, "cache hit");
                Ok(Some(self.codec.decode(&payload)?))
            }
            None => {
                self.stats.record_miss();
                debug!(key = %key, "cache miss");
                Ok(None)
            }
        }
    }

    /// Stores a value under `key`, honoring ttl and limit like decorated calls.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: u64,
        limit: u64,
        namespace: Option<&str>,
    ) -> Result<()> {
        self.check_limit(limit)?;
        let (key, index_key) = self.facade_keys(key, namespace)?;
        let payload = self.codec.encode(value)?;

        debug!(key = %key, ttl, limit, "storing");
        self.backend
            .store(WriteRequest {
                key,
                index_key,
                payload,
                ttl,
                limit,
            })
            .await?;
        self.stats.record_stores(1);
        Ok(())
    }

    /// Removes a value stored with `set`. Succeeds when nothing is stored.
    pub async fn invalidate(&self, key: &str, namespace: Option<&str>) -> Result<()> {
        let (key, index_key) = self.facade_keys(key, namespace)?;
        self.backend.invalidate(&key, &index_key).await?;
        self.stats.record_invalidation();
        debug!(key = %key, "invalidated");
        Ok(())
    }

    /// Removes every key of a namespace, including its index.
    pub async fn invalidate_namespace(&self, namespace: &str) -> Result<()> {
        validate_namespace(namespace)?;
        self.backend
            .invalidate_namespace(&self.prefix, namespace)
            .await?;
        self.stats.record_invalidation();
        Ok(())
    }

    // == Batched Resolve ==
    /// Keys the given calls resolve to, without touching storage.
    pub fn mget_keys(&self, calls: &[Call]) -> Result<Vec<String>> {
        calls.iter().map(Call::key).collect()
    }

    /// Resolves many calls with one batched lookup.
    ///
    /// Hits are deserialized, misses are computed one after another and
    /// stored together. Results follow the order of `calls`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unsupported` when caching is disabled.
    pub async fn mget(&self, calls: Vec<Call>) -> Result<Vec<Value>> {
        let keys = self.mget_keys(&calls)?;
        let found = self.backend.fetch_many(&keys).await?;

        let mut results = Vec::with_capacity(calls.len());
        let mut refills = Vec::new();
        for ((call, key), payload) in calls.into_iter().zip(keys).zip(found) {
            match payload {
                Some(payload) => {
                    self.stats.record_hit();
                    results.push(call.state().codec().deserialize(&payload)?);
                }
                None => {
                    self.stats.record_miss();
                    debug!(key = %key, "cache miss");
                    let (value, write) = call.refill(key).await?;
                    refills.push(write);
                    results.push(value);
                }
            }
        }

        if !refills.is_empty() {
            let count = refills.len() as u64;
            self.backend.store_many(refills).await?;
            self.stats.record_stores(count);
            debug!(count, "stored mget refills");
        }
        Ok(results)
    }
}

impl fmt::Debug for FlexCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexCache")
            .field("backend", &self.backend.kind())
            .field("prefix", &self.prefix)
            .field("codec", &self.codec)
            .finish()
    }
}

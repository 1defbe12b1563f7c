//! In-process backend over the expiring map.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::{Backend, BackendKind, WriteRequest};
use crate::cache::ExpiringMap;
use crate::codec::Payload;
use crate::error::{CacheError, Result};
use crate::keys::namespace_prefix;

/// Backend storing payloads in an `ExpiringMap` owned by this process.
///
/// Population limits are not supported.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    map: Arc<ExpiringMap>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose map sweeps every `prune_threshold` operations.
    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            map: Arc::new(ExpiringMap::with_prune_threshold(prune_threshold)),
        }
    }

    /// The underlying map.
    pub fn map(&self) -> &ExpiringMap {
        &self.map
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InProcess
    }

    async fn check(&self, key: &str) -> Result<Option<Payload>> {
        Ok(self.map.get(key))
    }

    async fn store(&self, write: WriteRequest) -> Result<()> {
        if write.limit != 0 {
            return Err(CacheError::Config(
                "in-process cache does not support limits, only ttl".to_string(),
            ));
        }
        self.map.set(write.key, write.payload, write.ttl);
        Ok(())
    }

    async fn invalidate(&self, key: &str, _index_key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn invalidate_namespace(&self, prefix: &str, namespace: &str) -> Result<()> {
        let removed = self.map.remove_prefix(&namespace_prefix(prefix, namespace));
        debug!(namespace = %namespace, removed, "invalidated in-process namespace");
        Ok(())
    }
}

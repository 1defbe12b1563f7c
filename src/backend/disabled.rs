//! Disabled backend: every lookup misses, every store is discarded.

use async_trait::async_trait;

use crate::backend::{Backend, BackendKind, WriteRequest};
use crate::codec::Payload;
use crate::error::{CacheError, Result};

/// Pass-through backend used to turn caching off without touching call sites.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBackend;

#[async_trait]
impl Backend for DisabledBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Disabled
    }

    // Nothing is stored, so any limit is trivially honored
    fn supports_limit(&self) -> bool {
        true
    }

    async fn check(&self, _key: &str) -> Result<Option<Payload>> {
        Ok(None)
    }

    async fn store(&self, _write: WriteRequest) -> Result<()> {
        Ok(())
    }

    async fn invalidate(&self, _key: &str, _index_key: &str) -> Result<()> {
        Ok(())
    }

    async fn invalidate_namespace(&self, _prefix: &str, _namespace: &str) -> Result<()> {
        Ok(())
    }

    async fn fetch_many(&self, _keys: &[String]) -> Result<Vec<Option<Payload>>> {
        Err(CacheError::Unsupported(
            "mget is not available when caching is disabled".to_string(),
        ))
    }
}

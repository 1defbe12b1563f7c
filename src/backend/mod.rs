//! Backend Module
//!
//! The capability interface every storage variant implements, selected once at
//! facade construction time.
//!
//! # Variants
//! - `MemoryBackend`: in-process expiring map
//! - `RedisBackend`: remote store with atomic write-with-ceiling
//! - `PersistentBackend`: SQLite file
//! - `DisabledBackend`: always misses, never stores

mod disabled;
mod memory;
mod persistent;
mod redis_impl;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::codec::Payload;
use crate::error::{CacheError, Result};

pub use disabled::DisabledBackend;
pub use memory::MemoryBackend;
pub use persistent::PersistentBackend;
pub use redis_impl::{RedisBackend, DEFAULT_SCAN_BATCH_SIZE};

// == Backend Kind ==
/// The four interchangeable storage variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    InProcess,
    Remote,
    Persistent,
    Disabled,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InProcess => "in-process",
            BackendKind::Remote => "remote",
            BackendKind::Persistent => "persistent",
            BackendKind::Disabled => "disabled",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in-process" | "memory" | "memcache" => Ok(BackendKind::InProcess),
            "remote" | "redis" | "rediscache" => Ok(BackendKind::Remote),
            "persistent" | "disk" | "diskcache" => Ok(BackendKind::Persistent),
            "disabled" | "none" | "nocache" => Ok(BackendKind::Disabled),
            other => Err(CacheError::Config(format!(
                "unsupported caching type: {}",
                other
            ))),
        }
    }
}

// == Write Request ==
/// One store operation: data key, namespace index, payload and policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub key: String,
    pub index_key: String,
    pub payload: Payload,
    /// Seconds, 0 = never expires
    pub ttl: u64,
    /// Maximum entries per namespace, 0 = unbounded
    pub limit: u64,
}

// == Backend Trait ==
/// Storage capability used by decorators and the facade.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether per-namespace population limits can be enforced.
    fn supports_limit(&self) -> bool {
        false
    }

    /// Looks a key up. Absent and expired entries are both `None`.
    async fn check(&self, key: &str) -> Result<Option<Payload>>;

    /// Stores a payload, enforcing TTL and limit.
    async fn store(&self, write: WriteRequest) -> Result<()>;

    /// Removes one key. Removing a missing key succeeds.
    async fn invalidate(&self, key: &str, index_key: &str) -> Result<()>;

    /// Removes every key under `{prefix}:{namespace}:`.
    async fn invalidate_namespace(&self, prefix: &str, namespace: &str) -> Result<()>;

    /// Looks up many keys; results follow the order of `keys`.
    async fn fetch_many(&self, keys: &[String]) -> Result<Vec<Option<Payload>>> {
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            found.push(self.check(key).await?);
        }
        Ok(found)
    }

    /// Stores many payloads.
    async fn store_many(&self, writes: Vec<WriteRequest>) -> Result<()> {
        for write in writes {
            self.store(write).await?;
        }
        Ok(())
    }
}

//! Configuration Module
//!
//! Loads cache and server settings from environment variables.

use std::env;
use std::path::PathBuf;

use crate::backend::{BackendKind, DEFAULT_SCAN_BATCH_SIZE};
use crate::cache::DEFAULT_PRUNE_THRESHOLD;
use crate::error::{CacheError, Result};
use crate::keys::validate_prefix;

/// Cache and server settings.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Which storage variant the facade uses
    pub backend: BackendKind,
    /// First segment of every key
    pub prefix: String,
    /// Serializer name, resolved by `Codec::resolve`
    pub serializer: String,
    /// Deserializer name, resolved by `Codec::resolve`
    pub deserializer: String,
    /// Directory of the persistent backend, temp dir when unset
    pub disk_directory: Option<PathBuf>,
    /// Redis connection URL for the remote backend
    pub redis_url: String,
    /// Keys per SCAN step and DEL batch during namespace invalidation
    pub scan_batch_size: usize,
    /// Operations between lazy sweeps of the in-process map
    pub prune_threshold: usize,
    /// HTTP server port
    pub server_port: u16,
}

impl Settings {
    /// Creates Settings by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `FLEX_CACHE_BACKEND` - Storage variant (default: in-process)
    /// - `FLEX_CACHE_PREFIX` - Key prefix (default: rc)
    /// - `FLEX_CACHE_SERIALIZER` / `FLEX_CACHE_DESERIALIZER` - Codec names (default: json)
    /// - `FLEX_CACHE_DISK_DIRECTORY` - Persistent cache directory (default: temp dir)
    /// - `FLEX_CACHE_PRUNE_THRESHOLD` - In-process sweep interval (default: 50)
    /// - `FLEX_CACHE_SCAN_BATCH` - Namespace sweep batch size (default: 500)
    /// - `REDIS_URL` - Redis URL (default: redis://localhost:6379/0)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Config` for an unknown backend name.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let backend = match env::var("FLEX_CACHE_BACKEND") {
            Ok(name) => name.parse()?,
            Err(_) => defaults.backend,
        };

        Ok(Self {
            backend,
            prefix: env::var("FLEX_CACHE_PREFIX").unwrap_or(defaults.prefix),
            serializer: env::var("FLEX_CACHE_SERIALIZER").unwrap_or(defaults.serializer),
            deserializer: env::var("FLEX_CACHE_DESERIALIZER").unwrap_or(defaults.deserializer),
            disk_directory: env::var_os("FLEX_CACHE_DISK_DIRECTORY").map(PathBuf::from),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            scan_batch_size: parsed("FLEX_CACHE_SCAN_BATCH", defaults.scan_batch_size),
            prune_threshold: parsed("FLEX_CACHE_PRUNE_THRESHOLD", defaults.prune_threshold),
            server_port: parsed("SERVER_PORT", defaults.server_port),
        })
    }

    /// Checks values that are only meaningful when positive.
    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.prefix)?;
        if self.scan_batch_size == 0 || self.prune_threshold == 0 {
            return Err(CacheError::Config(
                "scan batch size and prune threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::InProcess,
            prefix: "rc".to_string(),
            serializer: "json".to_string(),
            deserializer: "json".to_string(),
            disk_directory: None,
            redis_url: "redis://localhost:6379/0".to_string(),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            server_port: 3000,
        }
    }
}

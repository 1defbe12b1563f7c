//! Redis backend.
//!
//! # Atomicity
//!
//! - Writes go through the write-with-ceiling script, so storing a value and
//!   trimming the namespace index to its limit is one indivisible step.
//! - Single-key invalidation deletes the data key and its index entry inside
//!   `MULTI`/`EXEC`.
//! - Namespace invalidation is a cursor sweep and is not atomic: keys written
//!   behind the cursor survive it.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ErrorKind};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendKind, WriteRequest, DEFAULT_SCAN_BATCH_SIZE};
use crate::codec::Payload;
use crate::error::Result;
use crate::keys::namespace_pattern;

use super::error::map_redis_error;
use super::script::WriteScript;

/// Redis backend using a connection manager for multiplexing.
///
/// The write script is registered when the connection is set up and its
/// handle lives as long as this backend.
pub struct RedisBackend {
    conn: ConnectionManager,
    script: WriteScript,
    scan_batch_size: usize,
}

impl RedisBackend {
    /// Connects to Redis and registers the write script.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379/0")
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_batch_size(url, DEFAULT_SCAN_BATCH_SIZE).await
    }

    /// Like `connect`, with a custom namespace sweep batch size.
    pub async fn connect_with_batch_size(url: &str, scan_batch_size: usize) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        let script = WriteScript::new();
        script.load(&mut conn).await?;

        info!(url = %url, "connected to Redis");
        Ok(Self {
            conn,
            script,
            scan_batch_size: scan_batch_size.max(1),
        })
    }

    /// Number of entries currently tracked in a namespace index.
    pub async fn index_len(&self, index_key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.zcard(index_key).await.map_err(map_redis_error)
    }

    async fn delete_batch(&self, conn: &mut ConnectionManager, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        conn.del::<_, ()>(keys).await.map_err(map_redis_error)
    }
}

#[async_trait]
impl Backend for RedisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn supports_limit(&self) -> bool {
        true
    }

    async fn check(&self, key: &str) -> Result<Option<Payload>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(map_redis_error)?;
        Ok(value.map(Payload::Binary))
    }

    async fn store(&self, write: WriteRequest) -> Result<()> {
        let mut conn = self.conn.clone();
        self.script.invoke(&mut conn, &write).await?;
        debug!(key = %write.key, limit = write.limit, "stored in Redis");
        Ok(())
    }

    async fn invalidate(&self, key: &str, index_key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .zrem(index_key, key)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn invalidate_namespace(&self, prefix: &str, namespace: &str) -> Result<()> {
        let pattern = namespace_pattern(prefix, namespace);
        let mut conn = self.conn.clone();
        let mut pending: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch_size)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

            pending.extend(keys);
            while pending.len() >= self.scan_batch_size {
                let batch: Vec<String> = pending.drain(..self.scan_batch_size).collect();
                self.delete_batch(&mut conn, &batch).await?;
                removed += batch.len();
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        self.delete_batch(&mut conn, &pending).await?;
        removed += pending.len();

        info!(namespace = %namespace, removed, "invalidated Redis namespace");
        Ok(())
    }

    async fn fetch_many(&self, keys: &[String]) -> Result<Vec<Option<Payload>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(values
            .into_iter()
            .map(|value| value.map(Payload::Binary))
            .collect())
    }

    async fn store_many(&self, writes: Vec<WriteRequest>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let pipe = self.script.pipeline(&writes);

        let outcome: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
        match outcome {
            Ok(()) => {}
            // Server restarted or flushed its script cache since we connected
            Err(err) if err.kind() == ErrorKind::NoScriptError => {
                warn!("write script missing on server, reloading");
                self.script.load(&mut conn).await?;
                let _: () = pipe.query_async(&mut conn).await.map_err(map_redis_error)?;
            }
            Err(err) => return Err(map_redis_error(err)),
        }

        debug!(count = writes.len(), "stored batch in Redis");
        Ok(())
    }
}

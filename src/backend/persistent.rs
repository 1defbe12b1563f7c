//! Persistent backend on a local SQLite file.
//!
//! Survives process restarts. Expired rows are deleted when read; population
//! limits are not supported.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::backend::{Backend, BackendKind, WriteRequest};
use crate::cache::current_timestamp_ms;
use crate::codec::Payload;
use crate::error::{CacheError, Result};
use crate::keys::namespace_prefix;

/// File name of the database inside the cache directory
pub const DATABASE_FILE: &str = "flex_cache.sqlite3";

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    is_text INTEGER NOT NULL,
    expires_at INTEGER
);
";

const SELECT_ENTRY: &str = "SELECT value, is_text, expires_at FROM cache_entries WHERE key = ?1";
const UPSERT_ENTRY: &str =
    "INSERT OR REPLACE INTO cache_entries (key, value, is_text, expires_at) VALUES (?1, ?2, ?3, ?4)";
const DELETE_ENTRY: &str = "DELETE FROM cache_entries WHERE key = ?1";
const DELETE_PREFIX: &str = "DELETE FROM cache_entries WHERE key LIKE ?1 ESCAPE '\\'";

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

fn map_sqlite_error(err: tokio_rusqlite::Error) -> CacheError {
    match err {
        tokio_rusqlite::Error::ConnectionClosed => {
            CacheError::ConnectionFailed("SQLite connection closed".to_string())
        }
        other => CacheError::OperationFailed(other.to_string()),
    }
}

/// Default cache directory: `flex_cache` under the platform temp directory.
pub fn default_directory() -> PathBuf {
    std::env::temp_dir().join("flex_cache")
}

type Row = (Vec<u8>, bool, Option<i64>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn to_payload(value: Vec<u8>, is_text: bool) -> Payload {
    if !is_text {
        return Payload::Binary(value);
    }
    match String::from_utf8(value) {
        Ok(text) => Payload::Text(text),
        Err(err) => Payload::Binary(err.into_bytes()),
    }
}

/// Deadline in Unix milliseconds, clamped to the largest value SQLite stores.
fn expires_at(ttl: u64) -> Option<i64> {
    (ttl > 0).then(|| {
        let deadline = current_timestamp_ms().saturating_add(ttl.saturating_mul(1000));
        i64::try_from(deadline).unwrap_or(i64::MAX)
    })
}

/// Reads one key, deleting it when expired.
fn lookup(conn: &rusqlite::Connection, key: &str, now: i64) -> rusqlite::Result<Option<Payload>> {
    let row = conn.query_row(SELECT_ENTRY, [key], read_row).optional()?;
    match row {
        None => Ok(None),
        Some((_, _, Some(expires_at))) if expires_at < now => {
            conn.execute(DELETE_ENTRY, [key])?;
            Ok(None)
        }
        Some((value, is_text, _)) => Ok(Some(to_payload(value, is_text))),
    }
}

fn upsert(conn: &rusqlite::Connection, write: &WriteRequest) -> rusqlite::Result<()> {
    conn.execute(
        UPSERT_ENTRY,
        params![
            write.key,
            write.payload.as_bytes(),
            write.payload.is_text(),
            expires_at(write.ttl)
        ],
    )?;
    Ok(())
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn reject_limit(write: &WriteRequest) -> Result<()> {
    if write.limit != 0 {
        return Err(CacheError::Config(
            "persistent cache does not support limits, only ttl".to_string(),
        ));
    }
    Ok(())
}

/// SQLite-backed persistent cache.
pub struct PersistentBackend {
    conn: Connection,
    path: Option<PathBuf>,
}

impl PersistentBackend {
    /// Opens (or creates) the cache database in `directory`.
    ///
    /// Uses `default_directory()` when no directory is given.
    pub async fn open(directory: Option<&Path>) -> Result<Self> {
        let directory = directory
            .map(Path::to_path_buf)
            .unwrap_or_else(default_directory);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        let path = directory.join(DATABASE_FILE);
        let conn = Connection::open(path.clone())
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        Self::init_schema(&conn).await?;

        info!(path = %path.display(), "opened persistent cache");
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Opens a database that lives only as long as this backend.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        Self::init_schema(&conn).await?;
        Ok(Self { conn, path: None })
    }

    /// Location of the database file, None when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn init_schema(conn: &Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(CREATE_TABLE).map_err(wrap_err)?;
            Ok(())
        })
        .await
        .map_err(map_sqlite_error)
    }
}

#[async_trait]
impl Backend for PersistentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Persistent
    }

    async fn check(&self, key: &str) -> Result<Option<Payload>> {
        let key = key.to_string();
        let now = current_timestamp_ms() as i64;
        self.conn
            .call(move |conn| lookup(conn, &key, now).map_err(wrap_err))
            .await
            .map_err(map_sqlite_error)
    }

    async fn store(&self, write: WriteRequest) -> Result<()> {
        reject_limit(&write)?;
        self.conn
            .call(move |conn| upsert(conn, &write).map_err(wrap_err))
            .await
            .map_err(map_sqlite_error)
    }

    async fn invalidate(&self, key: &str, _index_key: &str) -> Result<()> {
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(DELETE_ENTRY, [&key]).map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(map_sqlite_error)
    }

    async fn invalidate_namespace(&self, prefix: &str, namespace: &str) -> Result<()> {
        let pattern = format!("{}%", escape_like(&namespace_prefix(prefix, namespace)));
        let removed = self
            .conn
            .call(move |conn| conn.execute(DELETE_PREFIX, [&pattern]).map_err(wrap_err))
            .await
            .map_err(map_sqlite_error)?;

        debug!(namespace = %namespace, removed, "invalidated persistent namespace");
        Ok(())
    }

    async fn fetch_many(&self, keys: &[String]) -> Result<Vec<Option<Payload>>> {
        let keys = keys.to_vec();
        let now = current_timestamp_ms() as i64;
        self.conn
            .call(move |conn| {
                keys.iter()
                    .map(|key| lookup(conn, key, now).map_err(wrap_err))
                    .collect()
            })
            .await
            .map_err(map_sqlite_error)
    }

    async fn store_many(&self, writes: Vec<WriteRequest>) -> Result<()> {
        for write in &writes {
            reject_limit(write)?;
        }
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;
                for write in &writes {
                    upsert(&tx, write).map_err(wrap_err)?;
                }
                tx.commit().map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(map_sqlite_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(key: &str, payload: Payload, ttl: u64) -> WriteRequest {
        WriteRequest {
            key: key.to_string(),
            index_key: "rc:ns:keys".to_string(),
            payload,
            ttl,
            limit: 0,
        }
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("rc:a_b%:"), r"rc:a\_b\%:");
    }

    #[test]
    fn test_to_payload_keeps_variant() {
        assert_eq!(to_payload(b"abc".to_vec(), true), Payload::Text("abc".to_string()));
        assert_eq!(to_payload(vec![0, 159], false), Payload::Binary(vec![0, 159]));
        // Invalid UTF-8 flagged as text degrades to binary
        assert_eq!(to_payload(vec![0, 159], true), Payload::Binary(vec![0, 159]));
    }

    #[tokio::test]
    async fn test_store_and_check_both_variants() {
        let backend = PersistentBackend::open_in_memory().await.unwrap();
        backend
            .store(write("rc:ns:text", Payload::Text("hello".to_string()), 0))
            .await
            .unwrap();
        backend
            .store(write("rc:ns:bin", Payload::Binary(vec![1, 2, 3]), 0))
            .await
            .unwrap();

        assert_eq!(
            backend.check("rc:ns:text").await.unwrap(),
            Some(Payload::Text("hello".to_string()))
        );
        assert_eq!(
            backend.check("rc:ns:bin").await.unwrap(),
            Some(Payload::Binary(vec![1, 2, 3]))
        );
    }

    #[tokio::test]
    async fn test_store_rejects_limit() {
        let backend = PersistentBackend::open_in_memory().await.unwrap();
        let mut request = write("rc:ns:a", Payload::Text("1".to_string()), 0);
        request.limit = 3;

        let result = backend.store(request).await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_expired_row_is_deleted_on_read() {
        let backend = PersistentBackend::open_in_memory().await.unwrap();
        backend
            .store(write("rc:ns:a", Payload::Text("1".to_string()), 1))
            .await
            .unwrap();
        assert!(backend.check("rc:ns:a").await.unwrap().is_some());

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        assert!(backend.check("rc:ns:a").await.unwrap().is_none());
    }

    #[test]
    fn test_expires_at_clamps_large_ttl() {
        assert_eq!(expires_at(0), None);
        assert_eq!(expires_at(u64::MAX), Some(i64::MAX));
        assert_eq!(expires_at(10_000_000_000_000_000), Some(i64::MAX));
        assert!(expires_at(60).unwrap() > current_timestamp_ms() as i64);
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let backend = PersistentBackend::open_in_memory().await.unwrap();
        backend
            .store(write("rc:ns:max", Payload::Text("1".to_string()), u64::MAX))
            .await
            .unwrap();
        backend
            .store(write("rc:ns:big", Payload::Text("2".to_string()), 10_000_000_000_000_000))
            .await
            .unwrap();

        assert!(backend.check("rc:ns:max").await.unwrap().is_some());
        assert!(backend.check("rc:ns:big").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_namespace_treats_wildcards_literally() {
        let backend = PersistentBackend::open_in_memory().await.unwrap();
        backend
            .store_many(vec![
                write("rc:a_b:1", Payload::Text("1".to_string()), 0),
                write("rc:axb:1", Payload::Text("2".to_string()), 0),
            ])
            .await
            .unwrap();

        backend.invalidate_namespace("rc", "a_b").await.unwrap();

        assert!(backend.check("rc:a_b:1").await.unwrap().is_none());
        assert!(backend.check("rc:axb:1").await.unwrap().is_some());
    }
}

//! Expiring Map Module
//!
//! In-process key/value container where every value carries an expiry policy.
//! Expired entries are removed lazily: on access, and by a full sweep every
//! `prune_threshold` operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, DEFAULT_PRUNE_THRESHOLD};
use crate::codec::Payload;

// == Expiring Map ==
/// Thread-safe expiring map.
///
/// Reads share the lock; inserts and deletes take it exclusively and only for
/// the duration of the map mutation.
#[derive(Debug)]
pub struct ExpiringMap {
    /// Key-value storage
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Operations since the last sweep
    operations: AtomicUsize,
    /// Operations between two sweeps
    prune_threshold: usize,
}

impl ExpiringMap {
    // == Constructor ==
    /// Creates an empty map sweeping every `DEFAULT_PRUNE_THRESHOLD` operations.
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    /// Creates an empty map with a custom sweep interval (clamped to at least 1).
    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            operations: AtomicUsize::new(0),
            prune_threshold: prune_threshold.max(1),
        }
    }

    pub fn prune_threshold(&self) -> usize {
        self.prune_threshold
    }

    // == Get ==
    /// Returns the stored payload, or None if absent or expired.
    ///
    /// An expired entry found here is deleted.
    pub fn get(&self, key: &str) -> Option<Payload> {
        let lookup = {
            let entries = self.entries.read();
            entries
                .get(key)
                .map(|entry| (!entry.is_expired()).then(|| entry.value.clone()))
        };

        let result = match lookup {
            None => None,
            Some(Some(value)) => Some(value),
            Some(None) => {
                let mut entries = self.entries.write();
                // Another writer may have refreshed the key in between
                if entries.get(key).is_some_and(CacheEntry::is_expired) {
                    entries.remove(key);
                    debug!(key = %key, "expired entry removed on access");
                }
                None
            }
        };

        self.record_operation();
        result
    }

    // == Set ==
    /// Stores a payload, replacing any prior entry and resetting its expiry.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The payload to store
    /// * `duration` - Lifetime in seconds, 0 = never expires
    pub fn set(&self, key: String, value: Payload, duration: u64) {
        let entry = CacheEntry::new(value, duration);
        self.entries.write().insert(key, entry);
        self.record_operation();
    }

    // == Remove ==
    /// Removes an entry. Returns whether something was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    // == Remove Prefix ==
    /// Removes every entry whose key starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    // == Prune Expired ==
    /// Removes all expired entries.
    ///
    /// Candidates are collected under the shared lock; each one is checked
    /// again under the exclusive lock so that a concurrent refresh survives.
    /// Returns the number of entries removed.
    pub fn prune_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        if expired_keys.is_empty() {
            return 0;
        }

        let mut removed = 0;
        let mut entries = self.entries.write();
        for key in expired_keys {
            if entries.get(&key).is_some_and(CacheEntry::is_expired) {
                entries.remove(&key);
                removed += 1;
            }
        }

        debug!(removed, "pruned expired entries");
        removed
    }

    // == Length ==
    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Counts an operation and sweeps once the threshold is reached.
    fn record_operation(&self) {
        let operations = self.operations.fetch_add(1, Ordering::AcqRel) + 1;
        if operations < self.prune_threshold {
            return;
        }
        // Only the caller that resets the counter runs the sweep
        if self
            .operations
            .compare_exchange(operations, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.prune_expired();
        }
    }
}

impl Default for ExpiringMap {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::{self, sleep};
    use std::time::Duration;

    fn text(value: &str) -> Payload {
        Payload::Text(value.to_string())
    }

    #[test]
    fn test_map_new() {
        let map = ExpiringMap::new();
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert_eq!(map.prune_threshold(), DEFAULT_PRUNE_THRESHOLD);
    }

    #[test]
    fn test_map_set_and_get() {
        let map = ExpiringMap::new();

        map.set("key1".to_string(), text("value1"), 0);

        assert_eq!(map.get("key1"), Some(text("value1")));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_map_get_nonexistent() {
        let map = ExpiringMap::new();
        assert!(map.get("nonexistent").is_none());
    }

    #[test]
    fn test_map_remove() {
        let map = ExpiringMap::new();

        map.set("key1".to_string(), text("value1"), 0);

        assert!(map.remove("key1"));
        assert!(map.is_empty());
        assert!(map.get("key1").is_none());
    }

    #[test]
    fn test_map_remove_nonexistent() {
        let map = ExpiringMap::new();
        assert!(!map.remove("nonexistent"));
    }

    #[test]
    fn test_map_overwrite() {
        let map = ExpiringMap::new();

        map.set("key1".to_string(), text("value1"), 0);
        map.set("key1".to_string(), text("value2"), 0);

        assert_eq!(map.get("key1"), Some(text("value2")));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_map_expired_entry_deleted_on_get() {
        let map = ExpiringMap::new();

        map.set("key1".to_string(), text("value1"), 1);
        assert!(map.get("key1").is_some());

        sleep(Duration::from_millis(1100));

        assert!(map.get("key1").is_none());
        assert!(!map.contains_key("key1"));
    }

    #[test]
    fn test_map_zero_duration_never_expires() {
        let map = ExpiringMap::new();

        map.set("forever".to_string(), text("value"), 0);
        sleep(Duration::from_millis(1100));

        assert_eq!(map.prune_expired(), 0);
        assert!(map.get("forever").is_some());
    }

    #[test]
    fn test_map_prune_expired() {
        let map = ExpiringMap::new();

        map.set("key1".to_string(), text("value1"), 1);
        map.set("key2".to_string(), text("value2"), 10);

        sleep(Duration::from_millis(1100));

        assert_eq!(map.prune_expired(), 1);
        assert_eq!(map.len(), 1);
        assert!(map.get("key2").is_some());
    }

    #[test]
    fn test_map_lazy_sweep_after_threshold() {
        let map = ExpiringMap::with_prune_threshold(5);

        map.set("stale1".to_string(), text("v"), 1);
        map.set("stale2".to_string(), text("v"), 1);

        sleep(Duration::from_millis(1100));

        // Two operations recorded so far; expired entries linger until the sweep
        map.set("fresh1".to_string(), text("v"), 0);
        map.set("fresh2".to_string(), text("v"), 0);
        assert_eq!(map.len(), 4);

        // Fifth operation triggers the sweep
        map.set("fresh3".to_string(), text("v"), 0);
        assert_eq!(map.len(), 3);
        assert!(!map.contains_key("stale1"));
        assert!(!map.contains_key("stale2"));
    }

    #[test]
    fn test_map_remove_prefix() {
        let map = ExpiringMap::new();

        map.set("rc:a:1".to_string(), text("v"), 0);
        map.set("rc:a:2".to_string(), text("v"), 0);
        map.set("rc:ab:1".to_string(), text("v"), 0);
        map.set("rc:b:1".to_string(), text("v"), 0);

        assert_eq!(map.remove_prefix("rc:a:"), 2);
        assert!(map.contains_key("rc:ab:1"));
        assert!(map.contains_key("rc:b:1"));
    }

    #[test]
    fn test_map_concurrent_access() {
        let map = Arc::new(ExpiringMap::with_prune_threshold(50));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..2_000 {
                        let key = format!("key{}", (i * 7 + worker) % 40);
                        map.set(key.clone(), text("value"), 1);
                        map.get(&key);
                        if i % 97 == 0 {
                            map.remove(&key);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(map.len() <= 40);
        for i in 0..40 {
            let key = format!("key{}", i);
            if let Some(value) = map.get(&key) {
                assert_eq!(value, text("value"));
            }
        }
    }
}

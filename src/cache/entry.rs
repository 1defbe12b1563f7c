//! Cache Entry Module
//!
//! Defines the structure for individual in-process entries with TTL support.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::Payload;

// == Cache Entry ==
/// A stored payload together with its expiry policy.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored payload
    pub value: Payload,
    /// Insertion timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Lifetime in seconds, 0 = never expires
    pub duration: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    ///
    /// # Arguments
    /// * `value` - The payload to store
    /// * `duration` - Lifetime in seconds (0 disables expiry)
    pub fn new(value: Payload, duration: u64) -> Self {
        Self {
            value,
            stored_at: current_timestamp_ms(),
            duration,
        }
    }

    // == Expires At ==
    /// Expiration timestamp in Unix milliseconds, or None if the entry never expires.
    pub fn expires_at(&self) -> Option<u64> {
        if self.duration == 0 {
            None
        } else {
            Some(self.stored_at.saturating_add(self.duration.saturating_mul(1000)))
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once `stored_at + duration` lies strictly in the past.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at() {
            Some(expires) => expires < now_ms,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in seconds, or None if no expiration is set.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.expires_at()
            .map(|expires| expires.saturating_sub(current_timestamp_ms()) / 1000)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

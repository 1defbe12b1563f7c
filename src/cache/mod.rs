//! Cache Module
//!
//! In-process building blocks: expiring entries, the expiring map and the
//! activity counters shared by every backend.

mod entry;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use stats::{CacheStats, StatsRecorder};
pub use store::ExpiringMap;

// == Public Constants ==
/// Operations between two full sweeps of expired entries
pub const DEFAULT_PRUNE_THRESHOLD: usize = 50;

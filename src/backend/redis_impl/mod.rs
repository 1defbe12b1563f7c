//! Redis backend implementation.
//!
//! Stores results in a remote Redis server shared between processes. Writes
//! with a population limit run as one server-side Lua script so the ceiling
//! holds under concurrent writers.

mod cache;
mod error;
mod script;

pub use cache::RedisBackend;

/// Keys deleted per round trip when sweeping a namespace
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 500;

//! Flex Cache - memoization over interchangeable cache backends
//!
//! Wraps async computations so their results are cached in-process, in Redis,
//! in a local SQLite file, or not at all, selected once at construction.

pub mod api;
pub mod backend;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod keys;
pub mod memo;
pub mod models;

pub use api::AppState;
pub use backend::{Backend, BackendKind};
pub use cache::CacheStats;
pub use codec::{Codec, Payload};
pub use config::Settings;
pub use error::{CacheError, Result};
pub use facade::FlexCache;
pub use memo::{Call, Decorator, DecoratorState, Memoized};

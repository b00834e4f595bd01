//! Cache Module
//!
//! Core data structures: entries, the LRU store, and the expiration and
//! tag indexes, plus the metrics sink.
//!
//! These are single-threaded building blocks; the engine composes one of
//! each per shard behind a lock and keeps them mutually consistent.

mod entry;
mod expiry;
mod lru;
mod stats;
mod tags;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{CacheEntry, Value};
pub use expiry::ExpirationIndex;
pub use lru::{InsertOutcome, LruStore};
pub use stats::{CacheStats, MetricsSink, StatsSnapshot};
pub use tags::TagIndex;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

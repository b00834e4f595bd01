//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and tag support.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Opaque value payload. The engine never interprets the bytes; callers
/// receive cheap read-only clones of the same allocation.
pub type Value = Arc<[u8]>;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Entries are owned exclusively by the store once inserted. The entry is
/// the source of truth for its own tag set; the tag index is a derived,
/// rebuildable secondary structure.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored payload, opaque to the engine
    pub value: Value,
    /// Tags this entry is registered under
    pub tags: HashSet<String>,
    /// Creation timestamp (engine clock, milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (engine clock, milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Approximate size in bytes, used for the per-entry size budget
    pub size_hint: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL.
    ///
    /// All timestamps come from the engine clock supplied as `now_ms`;
    /// this module never reads a wall clock.
    pub fn new(value: Value, tags: HashSet<String>, now_ms: u64, ttl: Option<Duration>) -> Self {
        let size_hint = value.len();
        let expires_at = ttl.map(|d| now_ms + d.as_millis() as u64);

        Self {
            value,
            tags,
            created_at: now_ms,
            expires_at,
            size_hint,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at the given clock reading.
    ///
    /// Boundary condition: expiry is exclusive-equal. An entry whose
    /// `expires_at` equals `now_ms` IS expired, so a key set with
    /// `ttl = d` at `t0` is a hit at `t0 + d - 1` and a miss at `t0 + d`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => expires <= now_ms,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// Returns `Some(0)` once the entry has expired.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.expires_at.map(|expires| expires.saturating_sub(now_ms))
    }
}

//! Expiration Index Module
//!
//! Tracks per-key absolute expiry deadlines and answers "next expiring
//! key" queries for the background sweeper.
//!
//! Backed by an ordered set keyed by `(deadline, key)` plus a key-to-deadline
//! map, so clearing a key's expiry is O(log n) instead of a scan. Entries
//! without a TTL are simply absent from this index.

use std::collections::{BTreeSet, HashMap};

// == Expiration Index ==
/// Min-ordered index over entry expiry deadlines (engine clock, ms).
#[derive(Debug, Default)]
pub struct ExpirationIndex {
    /// Deadlines ordered by (at, key)
    by_deadline: BTreeSet<(u64, String)>,
    /// Current deadline per key
    deadlines: HashMap<String, u64>,
}

impl ExpirationIndex {
    // == Constructor ==
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Set Expiry ==
    /// Registers or updates the expiry deadline for a key.
    pub fn set_expiry(&mut self, key: &str, at: u64) {
        if let Some(old) = self.deadlines.insert(key.to_string(), at) {
            self.by_deadline.remove(&(old, key.to_string()));
        }
        self.by_deadline.insert((at, key.to_string()));
    }

    // == Clear Expiry ==
    /// Removes a key's deadline. Clearing an untracked key is a no-op.
    pub fn clear_expiry(&mut self, key: &str) {
        if let Some(at) = self.deadlines.remove(key) {
            self.by_deadline.remove(&(at, key.to_string()));
        }
    }

    // == Peek Earliest ==
    /// Returns the key with the smallest deadline, if any.
    pub fn peek_earliest(&self) -> Option<(&str, u64)> {
        self.by_deadline
            .iter()
            .next()
            .map(|(at, key)| (key.as_str(), *at))
    }

    // == Pop Expired ==
    /// Removes and returns up to `max` keys whose deadline has passed.
    ///
    /// Expiry is exclusive-equal: a deadline of exactly `now_ms` counts as
    /// expired. The batch bound caps how long the sweeper holds the shard
    /// lock per tick.
    pub fn pop_expired(&mut self, now_ms: u64, max: usize) -> Vec<String> {
        let mut expired = Vec::new();

        while expired.len() < max {
            let entry = match self.by_deadline.iter().next() {
                Some((at, key)) if *at <= now_ms => (*at, key.clone()),
                _ => break,
            };
            self.by_deadline.remove(&entry);
            self.deadlines.remove(&entry.1);
            expired.push(entry.1);
        }

        expired
    }

    // == Is Expired ==
    /// Checks whether a tracked key's deadline has passed.
    ///
    /// Untracked keys never expire.
    pub fn is_expired(&self, key: &str, now_ms: u64) -> bool {
        self.deadlines.get(key).is_some_and(|&at| at <= now_ms)
    }

    /// Returns the tracked deadline for a key.
    pub fn deadline(&self, key: &str) -> Option<u64> {
        self.deadlines.get(key).copied()
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Returns true if no key has a deadline.
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

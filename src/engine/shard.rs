//! Shard Module
//!
//! One independent slice of the cache: an LRU store plus its expiration
//! and tag indexes, mutated together under the engine's shard lock.
//!
//! Referential integrity is the shard's job: after every mutating call
//! returns, no index entry points to a key absent from the store. Dangling
//! references are a programming error; they assert in debug builds and are
//! dropped quietly in release builds.

use crate::cache::{CacheEntry, ExpirationIndex, LruStore, TagIndex, Value};
use crate::error::Result;

// == Shard Read ==
/// Outcome of a read against one shard.
#[derive(Debug)]
pub(crate) enum ShardRead {
    /// Live entry; recency was touched and the value cloned out
    Hit(Value),
    /// Entry present but past its deadline and not yet swept
    Stale,
    /// Key absent
    Miss,
}

// == Shard ==
#[derive(Debug)]
pub(crate) struct Shard {
    lru: LruStore,
    expiry: ExpirationIndex,
    tags: TagIndex,
}

impl Shard {
    pub fn new(capacity: usize, max_entry_size: usize) -> Result<Self> {
        Ok(Self {
            lru: LruStore::new(capacity, max_entry_size)?,
            expiry: ExpirationIndex::new(),
            tags: TagIndex::new(),
        })
    }

    // == Read ==
    /// Looks up a key, touching recency only on a live hit.
    ///
    /// Expired-but-unswept entries are reported as `Stale` and left in
    /// place for the sweeper (or a rate-limited stale read).
    pub fn read(&mut self, key: &str, now_ms: u64) -> ShardRead {
        let expired = match self.lru.peek(key) {
            None => return ShardRead::Miss,
            Some(entry) => entry.is_expired_at(now_ms),
        };
        if expired {
            return ShardRead::Stale;
        }

        match self.lru.get(key) {
            Some(entry) => ShardRead::Hit(entry.value.clone()),
            None => ShardRead::Miss,
        }
    }

    /// Returns the value for a key regardless of expiry, without touching
    /// recency. Used for the stale-if-available fallback.
    pub fn read_stale(&self, key: &str) -> Option<Value> {
        self.lru.peek(key).map(|entry| entry.value.clone())
    }

    // == Insert ==
    /// Inserts an entry and reconciles all three structures.
    ///
    /// Returns the keys evicted to make room so the façade can record
    /// metrics and publish events.
    pub fn insert(&mut self, key: &str, entry: CacheEntry) -> Result<Vec<String>> {
        let expires_at = entry.expires_at;
        let tags = entry.tags.clone();

        let outcome = self.lru.insert(key.to_string(), entry)?;

        if let Some(replaced) = outcome.replaced {
            self.tags.remove_key(key, &replaced.tags);
        }

        let mut evicted = Vec::with_capacity(outcome.evicted.len());
        for (evicted_key, evicted_entry) in outcome.evicted {
            self.expiry.clear_expiry(&evicted_key);
            self.tags.remove_key(&evicted_key, &evicted_entry.tags);
            evicted.push(evicted_key);
        }

        match expires_at {
            Some(at) => self.expiry.set_expiry(key, at),
            None => self.expiry.clear_expiry(key),
        }
        self.tags.add_tags(key, &tags);

        Ok(evicted)
    }

    // == Remove ==
    /// Removes a key and its index entries. Absent keys are a no-op.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.lru.remove(key)?;
        self.expiry.clear_expiry(key);
        self.tags.remove_key(key, &entry.tags);
        Some(entry)
    }

    // == Touch Expiry ==
    /// Replaces a live entry's deadline in place.
    ///
    /// `None` makes the entry immortal. Returns false for absent keys.
    pub fn touch_expiry(&mut self, key: &str, expires_at: Option<u64>) -> bool {
        let Some(entry) = self.lru.peek_mut(key) else {
            return false;
        };
        entry.expires_at = expires_at;

        match expires_at {
            Some(at) => self.expiry.set_expiry(key, at),
            None => self.expiry.clear_expiry(key),
        }
        true
    }

    // == Invalidate Tag ==
    /// Removes every key currently under `tag`, returning the removed keys.
    ///
    /// Works from a snapshot of the tag's key set; concurrent writers may
    /// cause over-invalidation, never under-invalidation.
    pub fn invalidate_tag(&mut self, tag: &str) -> Vec<String> {
        let snapshot = self.tags.keys_for_tag(tag);
        let mut removed = Vec::with_capacity(snapshot.len());

        for key in snapshot {
            if self.remove(&key).is_some() {
                removed.push(key);
            } else {
                // dangling tag reference; repaired by the snapshot removal
                debug_assert!(false, "tag index referenced absent key {key}");
            }
        }

        removed
    }

    // == Sweep ==
    /// Reclaims up to `max` expired entries, returning their keys.
    pub fn sweep(&mut self, now_ms: u64, max: usize) -> Vec<String> {
        let expired = self.expiry.pop_expired(now_ms, max);
        let mut removed = Vec::with_capacity(expired.len());

        for key in expired {
            match self.lru.remove(&key) {
                Some(entry) => {
                    self.tags.remove_key(&key, &entry.tags);
                    removed.push(key);
                }
                None => {
                    debug_assert!(false, "expiration index referenced absent key {key}");
                }
            }
        }

        removed
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.lru.len()
    }

    /// Earliest pending deadline in this shard, if any.
    #[allow(dead_code)]
    pub fn next_deadline(&self) -> Option<u64> {
        self.expiry.peek_earliest().map(|(_, at)| at)
    }

    // == Integrity Check ==
    /// Verifies referential integrity across the three structures.
    #[cfg(test)]
    pub fn check_integrity(&self) {
        for key in self.lru.keys() {
            let entry = self.lru.peek(key).expect("key listed but absent");
            for tag in &entry.tags {
                assert!(
                    self.tags.has_tag(tag, key),
                    "entry tag {tag} missing from tag index for {key}"
                );
            }
            match entry.expires_at {
                Some(at) => assert_eq!(self.expiry.deadline(key), Some(at)),
                None => assert_eq!(self.expiry.deadline(key), None),
            }
        }
        assert!(self.expiry.len() <= self.lru.len());
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn entry(payload: &str, tags: &[&str], now: u64, ttl: Option<Duration>) -> CacheEntry {
        let tags: HashSet<String> = tags.iter().map(|t| t.to_string()).collect();
        CacheEntry::new(Value::from(payload.as_bytes()), tags, now, ttl)
    }

    #[test]
    fn test_read_states() {
        let mut shard = Shard::new(4, 1024).unwrap();
        shard
            .insert("a", entry("1", &[], 0, Some(Duration::from_millis(100))))
            .unwrap();

        assert!(matches!(shard.read("a", 50), ShardRead::Hit(_)));
        assert!(matches!(shard.read("a", 100), ShardRead::Stale));
        assert!(matches!(shard.read("missing", 0), ShardRead::Miss));
        shard.check_integrity();
    }

    #[test]
    fn test_stale_read_returns_value() {
        let mut shard = Shard::new(4, 1024).unwrap();
        shard
            .insert("a", entry("old", &[], 0, Some(Duration::from_millis(10))))
            .unwrap();

        let stale = shard.read_stale("a").unwrap();
        assert_eq!(&*stale, b"old");
    }

    #[test]
    fn test_insert_eviction_cleans_indexes() {
        let mut shard = Shard::new(2, 1024).unwrap();
        shard
            .insert("a", entry("1", &["t"], 0, Some(Duration::from_secs(60))))
            .unwrap();
        shard.insert("b", entry("2", &["t"], 0, None)).unwrap();

        let evicted = shard.insert("c", entry("3", &[], 0, None)).unwrap();

        assert_eq!(evicted, vec!["a".to_string()]);
        assert!(shard.expiry.is_empty());
        assert_eq!(shard.tags.keys_for_tag("t"), vec!["b".to_string()]);
        shard.check_integrity();
    }

    #[test]
    fn test_overwrite_reconciles_tags_and_expiry() {
        let mut shard = Shard::new(4, 1024).unwrap();
        shard
            .insert("a", entry("1", &["old"], 0, Some(Duration::from_secs(1))))
            .unwrap();
        shard.insert("a", entry("2", &["new"], 0, None)).unwrap();

        assert!(shard.tags.keys_for_tag("old").is_empty());
        assert_eq!(shard.tags.keys_for_tag("new"), vec!["a".to_string()]);
        assert_eq!(shard.expiry.deadline("a"), None);
        shard.check_integrity();
    }

    #[test]
    fn test_invalidate_tag() {
        let mut shard = Shard::new(4, 1024).unwrap();
        shard.insert("a", entry("1", &["t"], 0, None)).unwrap();
        shard.insert("b", entry("2", &["t", "u"], 0, None)).unwrap();
        shard.insert("c", entry("3", &["u"], 0, None)).unwrap();

        let mut removed = shard.invalidate_tag("t");
        removed.sort();

        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.tags.keys_for_tag("u"), vec!["c".to_string()]);
        shard.check_integrity();
    }

    #[test]
    fn test_sweep_reclaims_expired_only() {
        let mut shard = Shard::new(4, 1024).unwrap();
        shard
            .insert("a", entry("1", &["t"], 0, Some(Duration::from_millis(10))))
            .unwrap();
        shard
            .insert("b", entry("2", &[], 0, Some(Duration::from_millis(500))))
            .unwrap();
        shard.insert("c", entry("3", &[], 0, None)).unwrap();

        let removed = shard.sweep(100, 256);

        assert_eq!(removed, vec!["a".to_string()]);
        assert_eq!(shard.len(), 2);
        assert!(shard.tags.keys_for_tag("t").is_empty());
        shard.check_integrity();
    }

    #[test]
    fn test_touch_expiry() {
        let mut shard = Shard::new(4, 1024).unwrap();
        shard
            .insert("a", entry("1", &[], 0, Some(Duration::from_millis(100))))
            .unwrap();

        assert!(shard.touch_expiry("a", Some(5_000)));
        assert!(matches!(shard.read("a", 200), ShardRead::Hit(_)));

        assert!(shard.touch_expiry("a", None));
        assert_eq!(shard.expiry.deadline("a"), None);

        assert!(!shard.touch_expiry("missing", Some(1)));
        shard.check_integrity();
    }

    #[test]
    fn test_next_deadline() {
        let mut shard = Shard::new(4, 1024).unwrap();
        assert_eq!(shard.next_deadline(), None);

        shard
            .insert("a", entry("1", &[], 0, Some(Duration::from_millis(300))))
            .unwrap();
        shard
            .insert("b", entry("2", &[], 0, Some(Duration::from_millis(100))))
            .unwrap();

        assert_eq!(shard.next_deadline(), Some(100));
    }
}

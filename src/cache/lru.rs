//! LRU Store Module
//!
//! Fixed-capacity map with O(1) get/insert/evict.
//!
//! Recency is a doubly-linked list threaded through a slab of slots by
//! index, most-recently-used at the head, least at the tail. Relinking on
//! a hit is pure pointer surgery, so a `get` never scans.

use std::collections::HashMap;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// Sentinel for "no slot" in the recency links.
const NIL: usize = usize::MAX;

// == Slot ==
#[derive(Debug)]
struct Slot {
    key: String,
    entry: CacheEntry,
    prev: usize,
    next: usize,
}

// == Insert Outcome ==
/// What an insert displaced, reported so the caller can keep the
/// expiration and tag indexes consistent.
#[derive(Debug, Default)]
pub struct InsertOutcome {
    /// Entries evicted from the tail to make room, in eviction order
    pub evicted: Vec<(String, CacheEntry)>,
    /// Previous entry when the key already existed
    pub replaced: Option<CacheEntry>,
}

// == LRU Store ==
/// Fixed-capacity key-value storage with least-recently-used eviction.
///
/// Capacity is immutable after construction and never exceeded. Eviction
/// ties at the tail break by strict recency order, so the same operation
/// sequence always evicts the same keys.
#[derive(Debug)]
pub struct LruStore {
    /// Key to slot index
    map: HashMap<String, usize>,
    /// Slot arena; freed slots are recycled via the free list
    slots: Vec<Option<Slot>>,
    /// Indices of vacant slots
    free: Vec<usize>,
    /// Most recently used slot
    head: usize,
    /// Least recently used slot
    tail: usize,
    /// Maximum number of resident entries
    capacity: usize,
    /// Per-entry size budget in bytes
    max_entry_size: usize,
}

impl LruStore {
    // == Constructor ==
    /// Creates a store with the given capacity and per-entry size budget.
    ///
    /// A capacity of zero is a configuration error.
    pub fn new(capacity: usize, max_entry_size: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::CapacityMisconfigured(
                "LRU capacity must be positive".to_string(),
            ));
        }

        Ok(Self {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
            max_entry_size,
        })
    }

    // == Get ==
    /// Returns the entry for `key` and marks it most recently used.
    ///
    /// Does NOT consult expiration; the caller checks the expiration index
    /// first. Recency and expiry are deliberately separate bookkeeping.
    pub fn get(&mut self, key: &str) -> Option<&CacheEntry> {
        let idx = *self.map.get(key)?;
        self.detach(idx);
        self.attach_front(idx);
        self.slots[idx].as_ref().map(|s| &s.entry)
    }

    // == Peek ==
    /// Returns the entry for `key` without touching recency.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        let idx = *self.map.get(key)?;
        self.slots[idx].as_ref().map(|s| &s.entry)
    }

    /// Mutable access without touching recency, for in-place expiry updates.
    pub fn peek_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        let idx = *self.map.get(key)?;
        self.slots[idx].as_mut().map(|s| &mut s.entry)
    }

    // == Insert ==
    /// Inserts or replaces an entry, evicting from the tail until it fits.
    ///
    /// An existing key is updated in place and moved to the head. A new key
    /// at capacity evicts the least recently used entries first; every
    /// displaced entry is returned so the caller can clean up the other
    /// indexes.
    pub fn insert(&mut self, key: String, entry: CacheEntry) -> Result<InsertOutcome> {
        if entry.size_hint > self.max_entry_size {
            return Err(CacheError::EntryTooLarge {
                size: entry.size_hint,
                max: self.max_entry_size,
                key,
            });
        }

        if let Some(&idx) = self.map.get(&key) {
            self.detach(idx);
            self.attach_front(idx);
            let slot = self.slots[idx].as_mut().expect("linked slot occupied");
            let replaced = std::mem::replace(&mut slot.entry, entry);
            return Ok(InsertOutcome {
                evicted: Vec::new(),
                replaced: Some(replaced),
            });
        }

        let mut evicted = Vec::new();
        while self.map.len() >= self.capacity {
            match self.pop_tail() {
                Some(pair) => evicted.push(pair),
                None => break,
            }
        }

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(Slot {
                    key: key.clone(),
                    entry,
                    prev: NIL,
                    next: NIL,
                });
                idx
            }
            None => {
                self.slots.push(Some(Slot {
                    key: key.clone(),
                    entry,
                    prev: NIL,
                    next: NIL,
                }));
                self.slots.len() - 1
            }
        };

        self.attach_front(idx);
        self.map.insert(key, idx);

        Ok(InsertOutcome {
            evicted,
            replaced: None,
        })
    }

    // == Remove ==
    /// Removes an entry by key, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        let slot = self.slots[idx].take()?;
        self.free.push(idx);
        Some(slot.entry)
    }

    // == Pop Tail ==
    /// Removes and returns the least recently used entry.
    pub fn pop_tail(&mut self) -> Option<(String, CacheEntry)> {
        let idx = self.tail;
        if idx == NIL {
            return None;
        }
        self.detach(idx);
        let slot = self.slots[idx].take()?;
        self.free.push(idx);
        self.map.remove(&slot.key);
        Some((slot.key, slot.entry))
    }

    // == Tail Key ==
    /// Returns the least recently used key without removing it.
    pub fn tail_key(&self) -> Option<&str> {
        if self.tail == NIL {
            return None;
        }
        self.slots[self.tail].as_ref().map(|s| s.key.as_str())
    }

    // == Length ==
    /// Returns the number of resident entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Checks whether a key is resident.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Iterates over resident keys in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|k| k.as_str())
    }

    // == Recency Links ==
    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(slot) => (slot.prev, slot.next),
            None => return,
        };

        match prev {
            NIL => self.head = next,
            p => {
                if let Some(slot) = self.slots[p].as_mut() {
                    slot.next = next;
                }
            }
        }
        match next {
            NIL => self.tail = prev,
            n => {
                if let Some(slot) = self.slots[n].as_mut() {
                    slot.prev = prev;
                }
            }
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(slot) = self.slots[idx].as_mut() {
            slot.prev = NIL;
            slot.next = old_head;
        }
        match old_head {
            NIL => self.tail = idx,
            h => {
                if let Some(slot) = self.slots[h].as_mut() {
                    slot.prev = idx;
                }
            }
        }
        self.head = idx;
    }
}

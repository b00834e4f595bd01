//! Tag Index Module
//!
//! Maps tag -> set of keys for bulk invalidation.
//!
//! This is a derived, rebuildable secondary index: the `CacheEntry` owns
//! the authoritative tag set for its key, and the store façade supplies
//! that set back when removing a key.

use std::collections::{HashMap, HashSet};

// == Tag Index ==
/// Secondary index from tag to the keys carrying it.
#[derive(Debug, Default)]
pub struct TagIndex {
    tags: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    // == Constructor ==
    /// Creates an empty tag index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Add Tags ==
    /// Registers `key` under every tag in `tags`.
    pub fn add_tags<'a>(&mut self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    // == Remove Key ==
    /// Removes `key` from every tag in `tags`.
    ///
    /// Must be called with the entry's full known tag set; the caller owns
    /// that set, this index does not track per-key tag lists. Empty tag
    /// buckets are dropped.
    pub fn remove_key<'a>(&mut self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    // == Keys For Tag ==
    /// Returns a snapshot of the keys currently carrying `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.tags
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Checks whether `key` is registered under `tag`.
    pub fn has_tag(&self, tag: &str, key: &str) -> bool {
        self.tags.get(tag).is_some_and(|keys| keys.contains(key))
    }

    // == Length ==
    /// Returns the number of distinct tags with at least one key.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if no tag has any keys.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

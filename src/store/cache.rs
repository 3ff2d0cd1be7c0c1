//! Hot-set posting cache.
//!
//! An in-memory, concurrently-accessible mirror of the persistent posting
//! store, keyed the same way the persisted rows are (`ng:<ngram>`) so that
//! swapping this for a network-attached set store later only means
//! replacing this module. Intersection is performed by the caller; bigger
//! deployments would push intersection down into the cache tier itself.

use std::collections::HashSet;

use dashmap::DashMap;

fn cache_key(ngram: &str) -> String {
    format!("ng:{ngram}")
}

/// Concurrent hot-set cache over n-gram -> doc id set.
pub struct PostingCache {
    sets: DashMap<String, HashSet<i64>>,
}

impl PostingCache {
    pub fn new() -> Self {
        Self {
            sets: DashMap::new(),
        }
    }

    /// Overwrites the cached set for `ngram`.
    pub fn replace(&self, ngram: &str, ids: HashSet<i64>) {
        self.sets.insert(cache_key(ngram), ids);
    }

    /// Adds `ids` to whatever is already cached for `ngram`.
    pub fn union_insert(&self, ngram: &str, ids: &HashSet<i64>) {
        self.sets
            .entry(cache_key(ngram))
            .or_default()
            .extend(ids.iter().copied());
    }

    /// Returns the cached set for `ngram`, if present.
    pub fn get(&self, ngram: &str) -> Option<HashSet<i64>> {
        self.sets.get(&cache_key(ngram)).map(|r| r.value().clone())
    }

    /// Drops every cached entry, e.g. before a full rebuild from the
    /// persistent store.
    pub fn clear(&self) {
        self.sets.clear();
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl Default for PostingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_then_get_round_trips() {
        let cache = PostingCache::new();
        let ids: HashSet<i64> = [1, 2, 3].into_iter().collect();
        cache.replace("abc", ids.clone());
        assert_eq!(cache.get("abc"), Some(ids));
    }

    #[test]
    fn union_insert_merges_with_existing() {
        let cache = PostingCache::new();
        cache.replace("abc", [1, 2].into_iter().collect());
        cache.union_insert("abc", &[2, 3].into_iter().collect());
        let merged = cache.get("abc").unwrap();
        assert_eq!(merged, [1, 2, 3].into_iter().collect());
    }

    #[test]
    fn union_insert_creates_entry_if_absent() {
        let cache = PostingCache::new();
        cache.union_insert("new", &[5].into_iter().collect());
        assert_eq!(cache.get("new"), Some([5].into_iter().collect()));
    }

    #[test]
    fn missing_key_returns_none() {
        let cache = PostingCache::new();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = PostingCache::new();
        cache.replace("abc", [1].into_iter().collect());
        cache.clear();
        assert!(cache.is_empty());
    }
}

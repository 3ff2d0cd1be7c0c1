//! Document Store: document metadata plus the n-gram inverted index, split
//! across an authoritative persistent tier and an in-memory hot-set cache,
//! kept in sync with each other.

pub mod cache;
pub mod model;
pub mod sqlite;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::SearchError;
use cache::PostingCache;
use model::{Document, NewDocument, PostingMode};
use sqlite::SqliteStore;

pub use model::{Document as StoreDocument, NewDocument as StoreNewDocument};

/// The two-tier store: an authoritative SQLite persistent tier, and a
/// DashMap-backed hot-set cache used for fast intersection at query time.
pub struct Store {
    persistent: SqliteStore,
    cache: PostingCache,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

impl Store {
    /// Opens the store at `db_path`, creating its schema if needed, and
    /// rebuilds the hot-set cache tier from the persistent tier.
    pub fn open(db_path: &Path) -> Result<Self, SearchError> {
        let persistent = SqliteStore::open(db_path)?;
        let cache = PostingCache::new();
        let store = Self { persistent, cache };
        store.rebuild_cache()?;
        Ok(store)
    }

    fn rebuild_cache(&self) -> Result<(), SearchError> {
        self.cache.clear();
        for (ngram, ids) in self.persistent.all_postings()? {
            self.cache.replace(&ngram, ids);
        }
        debug!(entries = self.cache.len(), "posting cache rebuilt from persistent store");
        Ok(())
    }

    pub fn list_documents(&self, path_prefix: &str) -> Result<Vec<Document>, SearchError> {
        self.persistent.list_documents(path_prefix)
    }

    pub fn upsert_documents(&self, docs: &[NewDocument]) -> Result<Vec<Document>, SearchError> {
        self.persistent.upsert_documents(docs)
    }

    pub fn update_document_metadata(
        &self,
        id: i64,
        size: u64,
        last_modified: i64,
        mime_type: &str,
    ) -> Result<(), SearchError> {
        self.persistent
            .update_document_metadata(id, size, last_modified, mime_type)
    }

    pub fn touch_last_indexed(&self, ids: &[i64]) -> Result<(), SearchError> {
        self.persistent.touch_last_indexed(ids, now())
    }

    pub fn delete_documents(&self, ids: &[i64]) -> Result<(), SearchError> {
        self.persistent.delete_documents(ids)
    }

    /// Writes a batch of postings through both tiers: persistent first, then
    /// the cache, so readers can only ever observe the persistent value
    /// before the cache value, never the reverse.
    pub fn put_postings(
        &self,
        postings: &HashMap<String, HashSet<i64>>,
        mode: PostingMode,
    ) -> Result<(), SearchError> {
        if postings.is_empty() {
            return Ok(());
        }
        self.persistent.put_postings(postings, mode, now())?;
        for (ngram, ids) in postings {
            match mode {
                PostingMode::Replace => self.cache.replace(ngram, ids.clone()),
                PostingMode::Union => self.cache.union_insert(ngram, ids),
            }
        }
        Ok(())
    }

    /// Reads posting sets, preferring the hot-set cache and falling back to
    /// the persistent tier for any n-gram the cache hasn't seen yet.
    pub fn query_postings(
        &self,
        ngrams: &[String],
    ) -> Result<HashMap<String, HashSet<i64>>, SearchError> {
        let mut result = HashMap::with_capacity(ngrams.len());
        let mut misses = Vec::new();
        for ngram in ngrams {
            match self.cache.get(ngram) {
                Some(ids) => {
                    result.insert(ngram.clone(), ids);
                }
                None => misses.push(ngram.clone()),
            }
        }
        if !misses.is_empty() {
            let fetched = self.persistent.query_postings(&misses)?;
            for (ngram, ids) in fetched {
                self.cache.replace(&ngram, ids.clone());
                result.insert(ngram, ids);
            }
        }
        Ok(result)
    }

    pub fn filter_documents(
        &self,
        ids: Option<&HashSet<i64>>,
        size_lt: Option<u64>,
        size_gt: Option<u64>,
        path_regex: Option<&str>,
    ) -> Result<Vec<Document>, SearchError> {
        self.persistent
            .filter_documents(ids, size_lt, size_gt, path_regex)
    }

    /// Background sweep that drops posting references to ids no longer
    /// present in `documents`, and removes postings left with an empty set.
    /// Not run automatically.
    pub fn vacuum_postings(&self) -> Result<usize, SearchError> {
        let removed = self.persistent.vacuum_postings()?;
        self.rebuild_cache()?;
        Ok(removed)
    }
}

//! Query executor: drives the planner, intersects posting sets, applies
//! metadata filters, and hands surviving candidates to the verifier before
//! resolving URLs and reading content.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::debug;

use crate::error::SearchError;
use crate::planner::{self, Clause};
use crate::repo_url;
use crate::store::Store;
use crate::verify;

/// Request parameters for one search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub skip: usize,
    pub limit: usize,
    pub size_lt: Option<u64>,
    pub size_gt: Option<u64>,
    pub path_regex: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            skip: 0,
            limit: 50,
            size_lt: None,
            size_gt: None,
            path_regex: None,
        }
    }
}

/// Result of one search: total matches found, the pagination window
/// requested, and the page of resolved url/path -> content pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
    /// URL (or path, when no URL resolves) -> file content.
    pub matches: BTreeMap<String, String>,
}

/// Runs a full search: plan, intersect, filter, verify, paginate, resolve.
pub fn search(
    store: &Store,
    repo_dir: &Path,
    pattern: &str,
    k: usize,
    worker_pool_size: usize,
    opts: &SearchOptions,
) -> Result<SearchResult, SearchError> {
    let plan = planner::plan_regex(pattern, k)?;
    let candidate_ids = match plan {
        None => None,
        Some(clauses) => Some(intersect_clauses(store, &clauses)?),
    };

    let documents = store.filter_documents(
        candidate_ids.as_ref(),
        opts.size_lt,
        opts.size_gt,
        opts.path_regex.as_deref(),
    )?;

    let paths: Vec<String> = documents.into_iter().map(|d| d.path).collect();
    debug!(candidates = paths.len(), "filtered candidates before verification");

    let verified = verify::verify_paths(&paths, pattern, !opts.case_sensitive, worker_pool_size);
    let total = verified.len();

    let page: Vec<&String> = verified.iter().skip(opts.skip).take(opts.limit).collect();
    // Echo the page size actually returned, not the requested limit, matching
    // the original's `min(limit, len(filtered_matches))`.
    let limit = page.len();

    let mut matches = BTreeMap::new();
    for path in page {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "failed to read verified match, skipping");
                continue;
            }
        };
        let key = repo_url::resolve(Path::new(path), repo_dir).unwrap_or_else(|| path.clone());
        matches.insert(key, content);
    }

    Ok(SearchResult {
        total,
        skip: opts.skip,
        limit,
        matches,
    })
}

/// Evaluates each clause against the posting sets and intersects the results.
fn intersect_clauses(store: &Store, clauses: &[Clause]) -> Result<HashSet<i64>, SearchError> {
    let mut needed = Vec::new();
    for clause in clauses {
        match clause {
            Clause::Required(g) => needed.push(g.clone()),
            Clause::AnyOf(gs) => needed.extend(gs.iter().cloned()),
        }
    }
    let postings = store.query_postings(&needed)?;

    let mut result: Option<HashSet<i64>> = None;
    for clause in clauses {
        let set = match clause {
            Clause::Required(g) => postings.get(g).cloned().unwrap_or_default(),
            Clause::AnyOf(gs) => {
                let mut union = HashSet::new();
                for g in gs {
                    if let Some(ids) = postings.get(g) {
                        union.extend(ids);
                    }
                }
                union
            }
        };
        result = Some(match result {
            None => set,
            Some(acc) => acc.intersection(&set).cloned().collect(),
        });
    }
    Ok(result.unwrap_or_default())
}

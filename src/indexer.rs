//! Incremental indexer: reconciles tracked document state against the
//! filesystem and drives extraction + persistence in parallel batches.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::error::SearchError;
use crate::ngram;
use crate::store::model::{NewDocument, PostingMode};
use crate::store::Store;
use crate::workpool;

const ADMIT_BATCH_SIZE: usize = 2000;
const RECHECK_BATCH_SIZE: usize = 50;
const EXTRACT_BATCH_SIZE: usize = 1000;

/// Summary of one reconciliation pass, returned to the caller (CLI / service).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub added: usize,
    pub deleted: usize,
    pub reindexed: usize,
}

/// Runs one full reconciliation pass of `root` against `store`: scans the
/// filesystem, diffs it against tracked documents, deletes what's gone,
/// admits what's new, rechecks what's changed, then extracts and persists.
pub fn reconcile(
    store: &Store,
    root: &Path,
    max_file_size_bytes: u64,
    max_sparse_gram_length: usize,
    worker_pool_size: usize,
) -> Result<IndexReport, SearchError> {
    let fs_paths = scan_filesystem(root)?;
    let root_prefix = root.to_string_lossy().into_owned();
    let tracked: HashMap<String, crate::store::model::Document> = store
        .list_documents(&root_prefix)?
        .into_iter()
        .map(|d| (d.path.clone(), d))
        .collect();

    let tracked_paths: HashSet<String> = tracked.keys().cloned().collect();
    let added: Vec<String> = fs_paths.difference(&tracked_paths).cloned().collect();
    let deleted: Vec<i64> = tracked_paths
        .difference(&fs_paths)
        .filter_map(|p| tracked.get(p).map(|d| d.id))
        .collect();
    let checked: Vec<String> = tracked_paths.intersection(&fs_paths).cloned().collect();

    if !deleted.is_empty() {
        store.delete_documents(&deleted)?;
    }
    info!(deleted = deleted.len(), "removed documents no longer on disk");

    let mut extraction_queue: Vec<(i64, PathBuf)> = Vec::new();

    let admitted = admit_added(store, &added, max_file_size_bytes, worker_pool_size)?;
    extraction_queue.extend(admitted);

    let rechecked = recheck_tracked(store, &checked, &tracked, worker_pool_size)?;
    let reindexed_count = rechecked.len();
    extraction_queue.extend(rechecked);

    extract_and_persist(
        store,
        extraction_queue,
        max_sparse_gram_length,
        worker_pool_size,
    )?;

    Ok(IndexReport {
        added: added.len(),
        deleted: deleted.len(),
        reindexed: reindexed_count,
    })
}

/// Enumerates regular files under `root`, excluding any path with a
/// dotfile component. Gitignore rules are deliberately not consulted here —
/// the indexer's view of "what's on disk" is independent of VCS ignore
/// state.
fn scan_filesystem(root: &Path) -> Result<HashSet<String>, SearchError> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false);

    let mut paths = HashSet::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry during scan");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        paths.insert(entry.path().to_string_lossy().into_owned());
    }
    Ok(paths)
}

fn stat(path: &Path) -> Result<(u64, i64), SearchError> {
    let meta = std::fs::metadata(path)?;
    let size = meta.len();
    let mtime = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok((size, mtime))
}

/// Detects a file's mime type from its extension, falling back to a
/// null-byte heuristic (the same rule `git`/ripgrep use to tell text from
/// binary) for extension-less or unrecognized files — no magic-byte
/// detection crate is available in this stack.
fn detect_mime(path: &Path) -> String {
    let guess = mime_guess::from_path(path).first();
    if let Some(mime) = guess {
        return mime.essence_str().to_string();
    }
    if looks_like_text(path) {
        "text/plain".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

fn looks_like_text(path: &Path) -> bool {
    const SNIFF_LEN: usize = 512;
    match std::fs::read(path) {
        Ok(bytes) => !bytes.iter().take(SNIFF_LEN).any(|&b| b == 0),
        Err(_) => false,
    }
}

fn admit_added(
    store: &Store,
    added: &[String],
    max_file_size_bytes: u64,
    pool_size: usize,
) -> Result<Vec<(i64, PathBuf)>, SearchError> {
    if added.is_empty() {
        return Ok(Vec::new());
    }

    let candidates: Vec<NewDocument> = workpool::map_batches(
        added.to_vec(),
        pool_size,
        ADMIT_BATCH_SIZE,
        move |batch| -> Vec<NewDocument> {
            batch
                .into_iter()
                .filter_map(|path_str| {
                    let path = Path::new(&path_str);
                    let (size, mtime) = stat(path).ok()?;
                    if size > max_file_size_bytes {
                        return None;
                    }
                    let mime_type = detect_mime(path);
                    if !mime_type.starts_with("text/") {
                        return None;
                    }
                    Some(NewDocument {
                        path: path_str,
                        size,
                        last_modified: mtime,
                        mime_type,
                    })
                })
                .collect()
        },
    )
    .into_iter()
    .flatten()
    .collect();

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    // Newly admitted documents are extracted in the same pass, so hand the
    // upsert's own result straight to extraction.
    let inserted = store.upsert_documents(&candidates)?;
    Ok(inserted
        .into_iter()
        .map(|d| (d.id, PathBuf::from(d.path)))
        .collect())
}

fn recheck_tracked(
    store: &Store,
    checked: &[String],
    tracked: &HashMap<String, crate::store::model::Document>,
    pool_size: usize,
) -> Result<Vec<(i64, PathBuf)>, SearchError> {
    if checked.is_empty() {
        return Ok(Vec::new());
    }

    struct RecheckCandidate {
        id: i64,
        path: String,
        size: u64,
        mtime: i64,
        mime_type: String,
        needs_extraction: bool,
    }

    let docs: Vec<crate::store::model::Document> = checked
        .iter()
        .filter_map(|p| tracked.get(p).cloned())
        .collect();

    let results: Vec<RecheckCandidate> = workpool::map_batches(
        docs,
        pool_size,
        RECHECK_BATCH_SIZE,
        |batch| -> Vec<RecheckCandidate> {
            batch
                .into_iter()
                .filter_map(|doc| {
                    let path = Path::new(&doc.path);
                    let (size, mtime) = stat(path).ok()?;

                    let eligible = size != doc.size
                        || mtime != doc.last_modified
                        || (doc.last_indexed.is_none() && doc.mime_type.starts_with("text/"))
                        || doc.last_indexed.is_some_and(|li| li < mtime);

                    if !eligible {
                        return None;
                    }

                    let mime_type = detect_mime(path);
                    Some(RecheckCandidate {
                        id: doc.id,
                        path: doc.path.clone(),
                        size,
                        mtime,
                        mime_type: mime_type.clone(),
                        needs_extraction: mime_type.starts_with("text/"),
                    })
                })
                .collect()
        },
    )
    .into_iter()
    .flatten()
    .collect();

    let mut queue = Vec::new();
    for candidate in &results {
        store.update_document_metadata(
            candidate.id,
            candidate.size,
            candidate.mtime,
            &candidate.mime_type,
        )?;
        if candidate.needs_extraction {
            queue.push((candidate.id, PathBuf::from(&candidate.path)));
        }
    }
    Ok(queue)
}

fn extract_and_persist(
    store: &Store,
    queue: Vec<(i64, PathBuf)>,
    k: usize,
    pool_size: usize,
) -> Result<(), SearchError> {
    if queue.is_empty() {
        return Ok(());
    }

    let batches: Vec<(HashMap<String, HashSet<i64>>, Vec<i64>)> =
        workpool::map_batches(queue, pool_size, EXTRACT_BATCH_SIZE, move |batch| {
            let mut gram_map: HashMap<String, HashSet<i64>> = HashMap::new();
            let mut indexed_ids = Vec::new();
            for (id, path) in &batch {
                match std::fs::read(path) {
                    Ok(bytes) => {
                        let path_str = path.to_string_lossy();
                        match ngram::extract_ngrams_from_bytes(&path_str, &bytes, k) {
                            Ok(grams) => {
                                for gram in grams {
                                    gram_map.entry(gram).or_default().insert(*id);
                                }
                                indexed_ids.push(*id);
                            }
                            Err(e) => {
                                warn!(path = %path_str, error = %e, "file unreadable during extraction, skipping");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to read file during extraction, skipping");
                    }
                }
            }
            (gram_map, indexed_ids)
        });

    // Store sessions aren't shared across worker threads, so the actual
    // writes happen here, sequentially, one batch at a time.
    for (gram_map, indexed_ids) in &batches {
        if !gram_map.is_empty() {
            store.put_postings(gram_map, PostingMode::Union)?;
        }
        if !indexed_ids.is_empty() {
            store.touch_last_indexed(indexed_ids)?;
        }
    }

    debug!(batches = batches.len(), "extraction batches merged into store");
    Ok(())
}

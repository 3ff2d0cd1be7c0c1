//! Sparse n-gram extraction.
//!
//! Extracts a sparse cover of substrings from a token (here, a whole file's
//! decoded text — no word tokenization) by walking a bigram weight sequence
//! and emitting local maxima, bounded by a maximum gram length `K`. This is a
//! local-maximum walk, not an optimal cover: a later, slightly stronger bigram
//! inside the window can cause the loop to emit a gram shorter than the true
//! local maximum before it notices the stronger one. That behavior is
//! intentional here — the planner (`planner.rs`) derives its required grams
//! with the same walk, so index and query side must agree exactly, edge cases
//! included.

use std::collections::HashSet;

use crate::error::SearchError;

/// Default maximum sparse gram length, used when a document or query doesn't
/// override it.
pub const DEFAULT_MAX_SPARSE_GRAM_LENGTH: usize = 3;

/// Extracts the sparse n-gram set from already-decoded text.
///
/// Tokens shorter than 3 characters contribute no grams (there's no bigram
/// weight sequence of length >= 2 to walk).
pub fn extract_ngrams(token: &str, k: usize) -> HashSet<String> {
    let chars: Vec<char> = token.chars().collect();
    extract_from_chars(&chars, k)
}

fn extract_from_chars(chars: &[char], k: usize) -> HashSet<String> {
    let mut grams = HashSet::new();
    let len = chars.len();
    if len < 3 {
        return grams;
    }

    // w[i] = ord(chars[i]) + ord(chars[i+1]), for i in [0, len-1). len-1 weights total.
    let weights: Vec<i64> = (0..len - 1)
        .map(|i| chars[i] as i64 + chars[i + 1] as i64)
        .collect();

    // The walk only ever starts at weights[.. -1], i.e. indices [0, len-2).
    if weights.len() < 2 {
        return grams;
    }

    for start in 0..weights.len() - 1 {
        let start_weight = weights[start];
        let mut max_weight: i64 = -1;
        let upper = std::cmp::min(start + k, weights.len());
        for end in (start + 1)..upper {
            let current_weight = weights[end];
            if max_weight < current_weight {
                let gram_end = end + 2;
                if gram_end <= chars.len() {
                    grams.insert(chars[start..gram_end].iter().collect());
                }
                if start_weight == current_weight {
                    continue;
                }
                max_weight = current_weight;
                if start_weight < max_weight {
                    break;
                }
            }
        }
    }

    grams
}

/// Decodes raw file bytes as UTF-8 and extracts its sparse n-gram set.
///
/// A document that isn't valid UTF-8 is reported via
/// [`SearchError::UnreadableFile`] rather than aborting the caller's batch —
/// the indexer records an empty gram set for it and continues.
pub fn extract_ngrams_from_bytes(
    path: &str,
    bytes: &[u8],
    k: usize,
) -> Result<HashSet<String>, SearchError> {
    let text = std::str::from_utf8(bytes).map_err(|e| SearchError::UnreadableFile {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    Ok(extract_ngrams(text, k))
}

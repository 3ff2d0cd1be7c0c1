//! Precise verification pass: confirms candidates that survived the n-gram
//! prefilter actually match the user's regex, via an external regex tool
//! rather than re-implementing full regex matching in-process. Shells out
//! through `std::process::Command` instead of linking a client library.

use std::collections::HashSet;
use std::process::Command;

use tracing::warn;

use crate::error::SearchError;
use crate::workpool;

const VERIFY_CHUNK_SIZE: usize = 100;

/// Runs a precise regex pass over `paths`, returning the subset that truly
/// match `pattern`. Chunked across the worker pool; a chunk whose verifier
/// invocation fails abnormally contributes an empty result for that chunk
/// and is logged, rather than aborting the whole pass.
pub fn verify_paths(
    paths: &[String],
    pattern: &str,
    case_insensitive: bool,
    pool_size: usize,
) -> Vec<String> {
    if paths.is_empty() {
        return Vec::new();
    }
    let multiline = pattern.contains('\n');
    let owned: Vec<String> = paths.to_vec();
    let chunks = workpool::map_batches(owned, pool_size, VERIFY_CHUNK_SIZE, |chunk| {
        run_verifier(&chunk, pattern, case_insensitive, multiline)
    });

    // Preserve the caller's ranked ordering (filter_documents already sorted
    // by last_modified descending); the verifier only tells us which paths
    // survived.
    let matched: HashSet<String> = chunks.into_iter().flatten().collect();
    paths
        .iter()
        .filter(|p| matched.contains(p.as_str()))
        .cloned()
        .collect()
}

fn run_verifier(
    chunk: &[String],
    pattern: &str,
    case_insensitive: bool,
    multiline: bool,
) -> Vec<String> {
    let mut cmd = Command::new("grep");
    cmd.arg("-l").arg("-I").arg("-E");
    if case_insensitive {
        cmd.arg("-i");
    }
    if multiline {
        cmd.arg("-z");
    }
    cmd.arg(pattern);
    cmd.args(chunk);

    match cmd.output() {
        Ok(output) => {
            // grep exits 1 when nothing matched in the chunk; that's not a
            // failure, just an empty result.
            if output.status.success() || output.status.code() == Some(1) {
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(|l| l.trim_end_matches('\0').to_string())
                    .filter(|l| !l.is_empty())
                    .collect()
            } else {
                warn!(
                    status = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "verifier sub-process exited abnormally"
                );
                Vec::new()
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to spawn verifier sub-process");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn empty_input_returns_empty_without_spawning() {
        let result = verify_paths(&[], "anything", false, 4);
        assert!(result.is_empty());
    }

    #[test]
    fn matching_file_survives_verification() {
        let f = file_with("package main\n");
        let path = f.path().to_string_lossy().to_string();
        let result = verify_paths(&[path.clone()], "package", false, 2);
        assert_eq!(result, vec![path]);
    }

    #[test]
    fn non_matching_file_is_dropped() {
        let f = file_with("nothing interesting here\n");
        let path = f.path().to_string_lossy().to_string();
        let result = verify_paths(&[path], "package", false, 2);
        assert!(result.is_empty());
    }

    #[test]
    fn case_insensitive_flag_is_honored() {
        let f = file_with("PACKAGE main\n");
        let path = f.path().to_string_lossy().to_string();
        let result = verify_paths(&[path.clone()], "package", true, 2);
        assert_eq!(result, vec![path]);
    }
}

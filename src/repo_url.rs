//! Resolves an indexed file path to a human-readable URL.
//!
//! Shells out to the `git` CLI (`std::process::Command`, not the `git2`
//! crate) to read each candidate repository's `origin` remote.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Finds the repository containing `path` under `repo_dir` and returns a
/// `<host>/blob/master/<relative-path>`-shaped URL, or `None` if no
/// containing repository can be identified, its remote can't be read, or the
/// path lives inside that repository's `.git` directory.
pub fn resolve(path: &Path, repo_dir: &Path) -> Option<String> {
    let repo_root = find_repo_root(path, repo_dir)?;
    let relative = path.strip_prefix(&repo_root).ok()?;

    if relative.components().next().map(|c| c.as_os_str()) == Some(std::ffi::OsStr::new(".git")) {
        return None;
    }

    let origin = read_origin_url(&repo_root)?;
    let web_origin = normalize_origin(&origin)?;
    Some(format!(
        "{}/blob/master/{}",
        web_origin,
        relative.to_string_lossy()
    ))
}

/// Walks the immediate children of `repo_dir`, picking the one that both
/// contains `path` and looks like a git working directory (has a `.git`
/// entry).
fn find_repo_root(path: &Path, repo_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(repo_dir).ok()?;
    for entry in entries.flatten() {
        let candidate = entry.path();
        if !candidate.is_dir() {
            continue;
        }
        if !candidate.join(".git").exists() {
            continue;
        }
        if path.starts_with(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn read_origin_url(repo_root: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .args(["remote", "get-url", "origin"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if url.is_empty() {
        None
    } else {
        Some(url)
    }
}

/// `git@github.com:X/Y(.git)?` -> `https://github.com/X/Y`; strips a
/// trailing `.git` off any https origin too.
fn normalize_origin(origin: &str) -> Option<String> {
    let without_suffix = origin.strip_suffix(".git").unwrap_or(origin);

    if let Some(rest) = without_suffix.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        return Some(format!("https://{host}/{path}"));
    }

    Some(without_suffix.to_string())
}

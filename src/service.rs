//! Service aggregate: one explicitly constructed object holding the store
//! and configuration, injected into the CLI at startup.

use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::config::Config;
use crate::error::SearchError;
use crate::indexer::{self, IndexReport};
use crate::query::{self, SearchOptions, SearchResult};
use crate::store::Store;

/// The constructed aggregate: configuration plus the opened store. The
/// worker pool is not a persistent object here — `workpool::map_batches`
/// spins up scoped threads per call, so there's nothing to own across
/// operations beyond the pool size recorded in `config`.
pub struct Service {
    config: Config,
    store: Store,
}

impl Service {
    /// Opens the persistent store at `config.database_path` and rebuilds its
    /// cache tier.
    pub fn new(config: Config) -> Result<Self, SearchError> {
        let store = Store::open(&config.database_path)?;
        Ok(Self { config, store })
    }

    /// Triggers one reconciliation pass over `config.repo_dir`.
    pub fn index_repo_dir(&self) -> Result<IndexReport, SearchError> {
        info!(repo_dir = %self.config.repo_dir.display(), "starting indexing pass");
        indexer::reconcile(
            &self.store,
            &self.config.repo_dir,
            self.config.max_file_size_bytes,
            self.config.max_sparse_gram_length,
            self.config.worker_pool_size,
        )
    }

    /// Runs a search against the current index.
    pub fn search(&self, pattern: &str, opts: &SearchOptions) -> Result<SearchResult, SearchError> {
        query::search(
            &self.store,
            &self.config.repo_dir,
            pattern,
            self.config.max_sparse_gram_length,
            self.config.worker_pool_size,
            opts,
        )
    }

    /// Clones `url` under `config.repo_dir/<repo-name>`, surfacing a
    /// `RepoAlreadyExists` conflict rather than shelling out into an
    /// existing directory.
    pub fn clone_repo(&self, url: &str) -> Result<PathBuf, SearchError> {
        let name = repo_name_from_url(url)
            .ok_or_else(|| SearchError::InvalidArgs(format!("cannot derive repo name from '{url}'")))?;
        let dest = self.config.repo_dir.join(&name);
        if dest.exists() {
            return Err(SearchError::RepoAlreadyExists(dest.display().to_string()));
        }

        let status = Command::new("git")
            .arg("clone")
            .arg(url)
            .arg(&dest)
            .status()?;
        if !status.success() {
            return Err(SearchError::InvalidArgs(format!(
                "git clone of '{url}' failed with status {status}"
            )));
        }
        info!(url, dest = %dest.display(), "cloned repository");
        Ok(dest)
    }
}

fn repo_name_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_strips_git_suffix() {
        assert_eq!(
            repo_name_from_url("https://github.com/acme/widgets.git"),
            Some("widgets".to_string())
        );
    }

    #[test]
    fn repo_name_handles_ssh_style_url() {
        assert_eq!(
            repo_name_from_url("git@github.com:acme/widgets.git"),
            Some("widgets".to_string())
        );
    }

    #[test]
    fn repo_name_rejects_trailing_slash_only_url() {
        assert_eq!(repo_name_from_url("https://github.com/"), None);
    }

    #[test]
    fn clone_reports_conflict_when_destination_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("widgets")).unwrap();
        std::env::set_var("REPO_DIR", dir.path());
        std::env::set_var("MAX_SPARSE_GRAM_LENGTH", "3");
        let config = Config::from_env().unwrap();
        let service = Service::new(config).unwrap();

        let result = service.clone_repo("https://github.com/acme/widgets.git");
        assert!(matches!(result, Err(SearchError::RepoAlreadyExists(_))));
        std::env::remove_var("REPO_DIR");
        std::env::remove_var("MAX_SPARSE_GRAM_LENGTH");
    }
}

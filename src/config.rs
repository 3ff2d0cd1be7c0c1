//! Environment-backed configuration.
//!
//! A single tagged record constructed once and validated at construction
//! time. `.env` file loading happens upstream of this module; it only reads
//! whatever is already present in the process environment.

use std::path::PathBuf;

use crate::error::SearchError;
use crate::ngram::DEFAULT_MAX_SPARSE_GRAM_LENGTH;

const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;
const DEFAULT_WORKER_POOL_SIZE: usize = 12;

/// Resolved, validated configuration for one run of the engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root under which repositories are scanned (`REPO_DIR`).
    pub repo_dir: PathBuf,
    /// Files larger than this are skipped during admission.
    pub max_file_size_bytes: u64,
    /// `K`, the extractor's and planner's shared maximum gram-length bound.
    pub max_sparse_gram_length: usize,
    /// Where the persistent (SQLite) tier's database file lives.
    pub database_path: PathBuf,
    /// Fixed worker pool size used by the indexer and the query executor.
    pub worker_pool_size: usize,
    /// Hot-set cache host. The current cache tier (`store::cache`) is
    /// in-memory and doesn't dial out to it; a network-attached cache
    /// implementation would read this.
    pub cache_host: Option<String>,
    pub cache_port: Option<u16>,
}

impl Config {
    /// Builds a `Config` from process environment variables, failing fast on
    /// missing or malformed required fields.
    pub fn from_env() -> Result<Self, SearchError> {
        let repo_dir = std::env::var("REPO_DIR")
            .map_err(|_| SearchError::InvalidArgs("REPO_DIR is required".to_string()))?;
        let repo_dir = PathBuf::from(repo_dir);
        if !repo_dir.is_dir() {
            return Err(SearchError::DirNotFound(repo_dir.display().to_string()));
        }

        let max_file_size_mb = parse_env_or(
            "MAX_FILE_SIZE_TO_INDEX",
            DEFAULT_MAX_FILE_SIZE_MB,
        )?;
        let max_sparse_gram_length = parse_env_or(
            "MAX_SPARSE_GRAM_LENGTH",
            DEFAULT_MAX_SPARSE_GRAM_LENGTH,
        )?;
        if max_sparse_gram_length <= 2 {
            return Err(SearchError::InvalidArgs(
                "MAX_SPARSE_GRAM_LENGTH must be greater than 2".to_string(),
            ));
        }

        let worker_pool_size = parse_env_or("WORKER_POOL_SIZE", DEFAULT_WORKER_POOL_SIZE)?;

        let database_path = match std::env::var("DATABASE_URI") {
            Ok(uri) => PathBuf::from(uri),
            Err(_) => {
                let name = std::env::var("DATABASE_NAME").unwrap_or_else(|_| "gramsearch".to_string());
                repo_dir.join(format!(".{name}.sqlite3"))
            }
        };

        let cache_host = std::env::var("POSTING_CACHE_HOST").ok();
        let cache_port = std::env::var("POSTING_CACHE_PORT")
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .map_err(|_| SearchError::InvalidArgs("POSTING_CACHE_PORT must be a port number".to_string()))?;

        Ok(Config {
            repo_dir,
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            max_sparse_gram_length,
            database_path,
            worker_pool_size,
            cache_host,
            cache_port,
        })
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T, SearchError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| SearchError::InvalidArgs(format!("{key} must be a valid number"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "REPO_DIR",
            "MAX_FILE_SIZE_TO_INDEX",
            "MAX_SPARSE_GRAM_LENGTH",
            "WORKER_POOL_SIZE",
            "DATABASE_URI",
            "DATABASE_NAME",
            "POSTING_CACHE_HOST",
            "POSTING_CACHE_PORT",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_repo_dir_is_invalid_args() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let result = Config::from_env();
        assert!(matches!(result, Err(SearchError::InvalidArgs(_))));
    }

    #[test]
    fn nonexistent_repo_dir_is_dir_not_found() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("REPO_DIR", "/definitely/does/not/exist/anywhere");
        let result = Config::from_env();
        assert!(matches!(result, Err(SearchError::DirNotFound(_))));
        clear_env();
    }

    #[test]
    fn defaults_are_applied_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("REPO_DIR", dir.path());
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.max_file_size_bytes, DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024);
        assert_eq!(cfg.max_sparse_gram_length, DEFAULT_MAX_SPARSE_GRAM_LENGTH);
        assert_eq!(cfg.worker_pool_size, DEFAULT_WORKER_POOL_SIZE);
        clear_env();
    }

    #[test]
    fn invalid_gram_length_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("REPO_DIR", dir.path());
        std::env::set_var("MAX_SPARSE_GRAM_LENGTH", "2");
        let result = Config::from_env();
        assert!(matches!(result, Err(SearchError::InvalidArgs(_))));
        clear_env();
    }
}

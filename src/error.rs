//! Unified error type for the search engine.

use thiserror::Error;

/// All errors that can occur across indexing and query operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// I/O error (file read/write, directory access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistent store error (schema, read, write).
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A varint stream ended while the last byte still had the continuation bit set.
    #[error("invalid varint encoding: stream ended mid-value")]
    InvalidEncoding,

    /// A document's content could not be decoded as text during extraction.
    #[error("unreadable file '{path}': {message}")]
    UnreadableFile { path: String, message: String },

    /// The planner or verifier failed to interpret a regex.
    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    /// The external verifier sub-process exited abnormally.
    #[error("verifier failed: {0}")]
    VerifierFailure(String),

    /// The persistent store or cache tier could not be reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The cloning collaborator reported a conflict.
    #[error("repository already exists at {0}")]
    RepoAlreadyExists(String),

    /// A configured directory does not exist.
    #[error("directory does not exist: {0}")]
    DirNotFound(String),

    /// Mutually exclusive flags, missing configuration, or other argument validation error.
    #[error("{0}")]
    InvalidArgs(String),
}

//! Row types for the Document Store.

/// One indexed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: i64,
    pub path: String,
    pub size: u64,
    pub last_modified: i64,
    pub mime_type: String,
    pub last_indexed: Option<i64>,
}

/// A not-yet-persisted document observed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub path: String,
    pub size: u64,
    pub last_modified: i64,
    pub mime_type: String,
}

/// How a posting write merges with whatever is already stored for that n-gram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingMode {
    /// Overwrite the stored set entirely.
    Replace,
    /// `existing ∪ supplied`.
    Union,
}

//! Storage layer error types
//!
//! Every failure the store can surface is defined here with `thiserror`.
//! I/O failures carry the path they happened at so the caller's log line
//! says which file was involved.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::{BlobId, CommitId, InvalidNameError, TreeId};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// the storage root or one of its subdirectories could not be created
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// a collection could not be converted to or from its JSON form
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// writing a file failed; the previous contents are left in place
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// reading a file failed
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error without a more specific context
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// the storage root is missing and the store was opened without create_if_missing
    #[error("storage root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("blob not found: {0}")]
    BlobNotFound(BlobId),

    #[error("tree not found: {0}")]
    TreeNotFound(TreeId),

    #[error("commit not found: {0}")]
    CommitNotFound(CommitId),

    /// the tree has no entry with this name
    #[error("no entry named {name} in tree {tree}")]
    EntryNotFound { tree: TreeId, name: String },

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("invalid digest: {0}")]
    InvalidDigest(#[from] hex::FromHexError),

    /// stored content does not match the digest it is filed under
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: PathBuf, reason: String },

    /// compare-and-swap on a branch lost against another writer
    #[error("concurrent modification: branch {branch} moved since it was read")]
    ConcurrentModification { branch: String },

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the object doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RootNotFound(_)
                | StorageError::BlobNotFound(_)
                | StorageError::TreeNotFound(_)
                | StorageError::EntryNotFound { .. }
                | StorageError::CommitNotFound(_)
                | StorageError::BranchNotFound(_)
        )
    }

    /// check if this error is a conflict with existing state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::BranchAlreadyExists(_) | StorageError::ConcurrentModification { .. }
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

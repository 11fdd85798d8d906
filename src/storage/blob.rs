//! Blob storage for database files.
//!
//! Each distinct database file is stored once under `dbs/`, named by the
//! lowercase hex SHA-256 of its bytes. Writing content that is already
//! present is a no-op, decided by comparing the existing file's size with
//! the incoming buffer (optionally followed by a re-hash, see
//! [`StoreConfig::verify_existing_blobs`](crate::storage::StoreConfig)).

use std::fs;
use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::layout::{self, Layout};
use crate::storage::types::{BlobId, Digest};

/// metadata about a stored blob, without its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobMetadata {
    pub id: BlobId,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Content-addressed store for raw database bytes.
#[derive(Debug, Clone)]
pub struct BlobStore {
    layout: Layout,
    verify_existing: bool,
}

impl BlobStore {
    pub fn new(layout: Layout, verify_existing: bool) -> Self {
        Self {
            layout,
            verify_existing,
        }
    }

    /// Store a database file, returning its digest.
    ///
    /// Missing directories are created. The file is written when nothing is
    /// stored under the digest yet, or when the stored file's size differs
    /// from `bytes`; otherwise the existing file is left untouched.
    pub fn put(&self, bytes: &[u8]) -> StorageResult<BlobId> {
        layout::ensure_dir(&self.layout.blob_dir())?;

        let id = BlobId::new(Digest::of(bytes));
        let path = self.layout.blob_path(&id);

        // a failed stat is treated as "not stored yet"
        let existing = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(_) => {
                layout::write_atomic(&path, bytes)?;
                debug!(blob = %id, size = bytes.len(), "blob stored");
                return Ok(id);
            }
        };

        if existing.len() != bytes.len() as u64 {
            warn!(
                blob = %id,
                stored = existing.len(),
                incoming = bytes.len(),
                "stored blob size differs from its content, overwriting"
            );
            layout::write_atomic(&path, bytes)?;
            return Ok(id);
        }

        if self.verify_existing && !self.matches_digest(&id)? {
            warn!(blob = %id, "stored blob fails digest check, overwriting");
            layout::write_atomic(&path, bytes)?;
            return Ok(id);
        }

        debug!(blob = %id, "blob already stored");
        Ok(id)
    }

    /// Read a stored blob.
    pub fn get(&self, id: &BlobId) -> StorageResult<Vec<u8>> {
        layout::read_optional(&self.layout.blob_path(id))?
            .ok_or(StorageError::BlobNotFound(*id))
    }

    /// Check whether a blob is stored.
    pub fn contains(&self, id: &BlobId) -> bool {
        self.layout.blob_path(id).is_file()
    }

    /// Re-hash a stored blob and compare with the digest it is filed under.
    pub fn verify(&self, id: &BlobId) -> StorageResult<()> {
        if self.matches_digest(id)? {
            Ok(())
        } else {
            Err(StorageError::CorruptedData {
                path: self.layout.blob_path(id),
                reason: "content does not hash to its file name".to_string(),
            })
        }
    }

    fn matches_digest(&self, id: &BlobId) -> StorageResult<bool> {
        let bytes = self.get(id)?;
        Ok(Digest::of(&bytes) == id.digest())
    }

    /// List metadata for every stored blob, ordered by digest.
    ///
    /// An empty or missing `dbs/` directory yields an empty list.
    pub fn list(&self) -> StorageResult<Vec<BlobMetadata>> {
        let dir = self.layout.blob_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                error!(path = %dir.display(), err = %source, "failed to list blobs");
                return Err(StorageError::Read { path: dir, source });
            }
        };

        let mut blobs = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(path = %entry.path().display(), "skipping non-utf8 file in blob directory");
                continue;
            };

            let id = match BlobId::from_hex(name) {
                Ok(id) => id,
                Err(_) => {
                    if !name.starts_with('.') {
                        warn!(file = name, "skipping unexpected file in blob directory");
                    }
                    continue;
                }
            };

            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }

            blobs.push(BlobMetadata {
                id,
                size: meta.len(),
                modified: DateTime::<Utc>::from(meta.modified()?),
            });
        }

        blobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(blobs)
    }
}

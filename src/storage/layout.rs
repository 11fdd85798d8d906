//! On-disk layout of a storage root.
//!
//! ```text
//! <root>/branches        branch name -> commit id, pretty JSON
//! <root>/index           ordered commit history, pretty JSON
//! <root>/dbs/<hex>       one file per unique database blob
//! <root>/trees/<hex>     tree entry lists, pretty JSON
//! ```
//!
//! Every file is written whole: the bytes go to a temporary file in the
//! destination directory which is then renamed over the target, so a
//! failed write never leaves a torn file behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::error;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, TreeId};

pub(crate) const BRANCHES_FILE: &str = "branches";
pub(crate) const INDEX_FILE: &str = "index";
pub(crate) const BLOB_DIR: &str = "dbs";
pub(crate) const TREE_DIR: &str = "trees";

/// prefix of in-flight temporary files, never a valid digest
const TMP_PREFIX: &str = ".tmp-";

/// mode for stored files before the umask; temp files default to 0600
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Paths of everything under one storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn branches_path(&self) -> PathBuf {
        self.root.join(BRANCHES_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.root.join(BLOB_DIR)
    }

    pub fn blob_path(&self, id: &BlobId) -> PathBuf {
        self.blob_dir().join(id.to_hex())
    }

    pub fn tree_dir(&self) -> PathBuf {
        self.root.join(TREE_DIR)
    }

    pub fn tree_path(&self, id: &TreeId) -> PathBuf {
        self.tree_dir().join(id.to_hex())
    }
}

/// Create a directory (and its parents) unless it can already be stat'ed.
///
/// Any stat failure is taken to mean "missing", permission errors
/// included; if the directory really is unusable the create or the
/// following write reports it.
pub(crate) fn ensure_dir(path: &Path) -> StorageResult<()> {
    if fs::metadata(path).is_ok() {
        return Ok(());
    }

    fs::create_dir_all(path).map_err(|source| {
        error!(path = %path.display(), err = %source, "failed to create storage directory");
        StorageError::CreateDir {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Replace the file at `path` with `bytes` in one atomic step.
///
/// The parent directory must exist. On unix the file is created with
/// mode 0644, filtered by the process umask.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::Internal(format!("{} has no parent", path.display())))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(TMP_PREFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(FILE_MODE));
    }
    let mut tmp = builder.tempfile_in(dir).map_err(|e| write_error(path, e))?;
    tmp.write_all(bytes).map_err(|e| write_error(path, e))?;
    tmp.as_file().sync_all().map_err(|e| write_error(path, e))?;
    persist(tmp, path)
}

fn persist(tmp: NamedTempFile, path: &Path) -> StorageResult<()> {
    tmp.persist(path).map_err(|e| write_error(path, e.error))?;
    Ok(())
}

fn write_error(path: &Path, source: io::Error) -> StorageError {
    error!(path = %path.display(), err = %source, "failed to write file");
    StorageError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a whole file, mapping "not found" to `None`.
pub(crate) fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => {
            error!(path = %path.display(), err = %source, "failed to read file");
            Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Digest;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new("/data/store");
        let id = BlobId::new(Digest::of(b"hello-db-bytes"));

        assert_eq!(layout.branches_path(), PathBuf::from("/data/store/branches"));
        assert_eq!(layout.index_path(), PathBuf::from("/data/store/index"));
        assert_eq!(
            layout.blob_path(&id),
            PathBuf::from(
                "/data/store/dbs/3c97726c4729f3015e5740bff6ae7b3e615069267312ff605a8f62bd4dfb7aa7"
            )
        );
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());

        // second call is a no-op
        ensure_dir(&nested).unwrap();
    }

    #[test]
    fn test_ensure_dir_fails_under_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();

        let result = ensure_dir(&file.join("sub"));
        assert!(matches!(result, Err(StorageError::CreateDir { .. })));
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("branches");

        write_atomic(&path, b"a much longer first version").unwrap();
        write_atomic(&path, b"short").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"short");

        // no temp files left behind
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("branches")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_uses_umask_filtered_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let stored = dir.path().join("index");
        let plain = dir.path().join("plain");

        write_atomic(&stored, b"[]").unwrap();
        // fs::write creates with 0666 minus the umask
        fs::write(&plain, b"[]").unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&stored), mode(&plain) & FILE_MODE);
    }

    #[test]
    fn test_write_atomic_missing_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("index");

        let result = write_atomic(&path, b"[]");
        assert!(matches!(result, Err(StorageError::Write { .. })));
    }

    #[test]
    fn test_read_optional() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index");

        assert!(read_optional(&path).unwrap().is_none());
        fs::write(&path, b"[]").unwrap();
        assert_eq!(read_optional(&path).unwrap(), Some(b"[]".to_vec()));
    }
}

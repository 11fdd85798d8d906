//! Store configuration.

use std::path::PathBuf;

/// Store configuration options.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Storage root directory.
    pub root: PathBuf,
    /// Create the root on open if it doesn't exist.
    pub create_if_missing: bool,
    /// Re-hash an existing blob of matching size before skipping the write.
    ///
    /// Off by default: a file whose size matches the incoming buffer is
    /// assumed identical, which is only wrong if the file was damaged in
    /// place without changing length.
    pub verify_existing_blobs: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".dbstore"),
            create_if_missing: true,
            verify_existing_blobs: false,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration rooted at the given path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set verify_existing_blobs flag.
    pub fn verify_existing_blobs(mut self, value: bool) -> Self {
        self.verify_existing_blobs = value;
        self
    }
}

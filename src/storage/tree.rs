//! Trees: snapshots of which database files make up a version.
//!
//! A tree is an ordered list of entries, each naming a stored blob (or a
//! nested tree) by digest. Its identity is the SHA-256 of the entries
//! serialized one per record as
//!
//! ```text
//! <type char> NUL <hex digest> NUL <name> LF
//! ```
//!
//! in the order given. Order matters, so [`tree_digest`] hashes exactly
//! what it is handed while [`TreeBuilder`] sorts entries by name first.
//! Use the builder unless you are reproducing a known digest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::layout::{self, Layout};
use crate::storage::types::{BlobId, Digest, InvalidNameError, TreeId};

/// single character classifier of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeEntryType {
    /// a database file stored in the blob store
    #[serde(rename = "d")]
    Database,
    /// a nested tree
    #[serde(rename = "t")]
    Tree,
}

impl TreeEntryType {
    pub fn as_char(self) -> char {
        match self {
            TreeEntryType::Database => 'd',
            TreeEntryType::Tree => 't',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'd' => Some(TreeEntryType::Database),
            't' => Some(TreeEntryType::Tree),
            _ => None,
        }
    }
}

/// one named reference inside a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    #[serde(rename = "type")]
    pub entry_type: TreeEntryType,
    pub digest: Digest,
    pub name: String,
}

impl TreeEntry {
    pub fn new(entry_type: TreeEntryType, digest: Digest, name: impl Into<String>) -> Self {
        Self {
            entry_type,
            digest,
            name: name.into(),
        }
    }

    /// entry for a database file
    pub fn database(name: impl Into<String>, blob: BlobId) -> Self {
        Self::new(TreeEntryType::Database, blob.digest(), name)
    }

    /// entry for a nested tree
    pub fn tree(name: impl Into<String>, tree: TreeId) -> Self {
        Self::new(TreeEntryType::Tree, tree.digest(), name)
    }
}

/// serialize entries in the order given
fn encode_entries(entries: &[TreeEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut type_buf = [0u8; 4];
    for entry in entries {
        let type_char = entry.entry_type.as_char().encode_utf8(&mut type_buf);
        buf.extend_from_slice(type_char.as_bytes());
        buf.push(0);
        buf.extend_from_slice(entry.digest.to_hex().as_bytes());
        buf.push(0);
        buf.extend_from_slice(entry.name.as_bytes());
        buf.push(b'\n');
    }
    buf
}

/// Digest of an entry sequence, in the order given.
///
/// Two lists holding the same entries in a different order hash
/// differently.
pub fn tree_digest(entries: &[TreeEntry]) -> TreeId {
    TreeId::new(Digest::of(&encode_entries(entries)))
}

/// An immutable tree snapshot together with its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    id: TreeId,
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// wrap entries as-is, hashing them in their current order
    pub fn from_entries(entries: Vec<TreeEntry>) -> Self {
        Self {
            id: tree_digest(&entries),
            entries,
        }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// look up an entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// blob id of a database entry
    pub fn database(&self, name: &str) -> Option<BlobId> {
        self.get(name)
            .filter(|e| e.entry_type == TreeEntryType::Database)
            .map(|e| BlobId::new(e.digest))
    }
}

/// Collects entries and builds a tree in canonical (name) order.
///
/// Inserting a name twice keeps the last entry.
#[derive(Debug, Default, Clone)]
pub struct TreeBuilder {
    entries: BTreeMap<String, TreeEntry>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// start from an existing tree's entries
    pub fn from_tree(tree: &Tree) -> Self {
        Self {
            entries: tree
                .entries
                .iter()
                .map(|e| (e.name.clone(), e.clone()))
                .collect(),
        }
    }

    /// add or replace an entry
    ///
    /// Names must be non-empty and may not contain NUL, newline or `/`,
    /// any of which would make the serialized form ambiguous.
    pub fn insert(&mut self, entry: TreeEntry) -> Result<&mut Self, InvalidNameError> {
        validate_entry_name(&entry.name)?;
        self.entries.insert(entry.name.clone(), entry);
        Ok(self)
    }

    /// remove an entry, returning it if present
    pub fn remove(&mut self, name: &str) -> Option<TreeEntry> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(&self) -> Tree {
        Tree::from_entries(self.entries.values().cloned().collect())
    }
}

fn validate_entry_name(name: &str) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }
    for (i, c) in name.chars().enumerate() {
        if c == '\0' || c == '\n' || c == '/' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }
    Ok(())
}

/// Persist a tree's entry list under `trees/<hex>`.
///
/// Trees are immutable, so an existing file is left alone.
pub fn write_tree(layout: &Layout, tree: &Tree) -> StorageResult<TreeId> {
    layout::ensure_dir(&layout.tree_dir())?;

    let path = layout.tree_path(&tree.id);
    if path.is_file() {
        debug!(tree = %tree.id, "tree already stored");
        return Ok(tree.id);
    }

    let bytes = serde_json::to_vec_pretty(&tree.entries)?;
    layout::write_atomic(&path, &bytes)?;
    debug!(tree = %tree.id, entries = tree.entries.len(), "tree stored");
    Ok(tree.id)
}

/// Load a tree and check that its entries still hash to its id.
pub fn read_tree(layout: &Layout, id: TreeId) -> StorageResult<Tree> {
    let path = layout.tree_path(&id);
    let bytes = layout::read_optional(&path)?.ok_or(StorageError::TreeNotFound(id))?;
    let entries: Vec<TreeEntry> = serde_json::from_slice(&bytes)?;

    let tree = Tree::from_entries(entries);
    if tree.id != id {
        return Err(StorageError::CorruptedData {
            path,
            reason: format!("entries hash to {}", tree.id),
        });
    }
    Ok(tree)
}

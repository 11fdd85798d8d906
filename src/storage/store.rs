//! The store handle.
//!
//! `Store` owns one storage root and is the entry point for everything the
//! storage layer does: blob writes, tree and commit persistence, and branch
//! updates. Each handle is explicit about its root, so several isolated
//! stores can live in one process.
//!
//! Read-modify-write sequences on the branches and index files run under
//! an in-process mutex. Separate processes sharing a root are not
//! coordinated; the last writer wins.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::storage::blob::{BlobMetadata, BlobStore};
use crate::storage::commit::{Commit, CommitBuilder};
use crate::storage::config::StoreConfig;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::index;
use crate::storage::layout::{self, Layout};
use crate::storage::refs::{self, Branch};
use crate::storage::tree::{self, Tree, TreeBuilder, TreeEntry, TreeEntryType};
use crate::storage::types::{BlobId, BranchName, CommitId, Signature, TreeId};

/// A handle to one storage root.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    layout: Layout,
    blobs: BlobStore,
    /// guards read-modify-write of `branches` and `index`
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.inner.layout.root())
            .field("verify_existing_blobs", &self.inner.config.verify_existing_blobs)
            .finish()
    }
}

/// A new database version to record on a branch.
#[derive(Debug, Clone)]
pub struct DatabaseCommit<'a> {
    /// entry name of the database inside the tree
    pub name: &'a str,
    pub bytes: &'a [u8],
    pub author: Signature,
    pub committer: Option<Signature>,
    pub message: &'a str,
    /// commit time; now when unset
    pub timestamp: Option<DateTime<Utc>>,
}

impl<'a> DatabaseCommit<'a> {
    pub fn new(name: &'a str, bytes: &'a [u8], author: Signature, message: &'a str) -> Self {
        Self {
            name,
            bytes,
            author,
            committer: None,
            message,
            timestamp: None,
        }
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl Store {
    /// Open a store at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(StoreConfig::new(root.as_ref()))
    }

    /// Open a store with custom configuration.
    pub fn open_with_config(config: StoreConfig) -> StorageResult<Self> {
        if config.create_if_missing {
            layout::ensure_dir(&config.root)?;
        } else if !config.root.is_dir() {
            error!(path = %config.root.display(), "storage root does not exist");
            return Err(StorageError::RootNotFound(config.root.clone()));
        }

        let layout = Layout::new(&config.root);
        let blobs = BlobStore::new(layout.clone(), config.verify_existing_blobs);
        debug!(root = %config.root.display(), "store opened");

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                layout,
                blobs,
                write_lock: Mutex::new(()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        self.inner.layout.root()
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Run `f` while holding the store's write lock.
    fn with_write_lock<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Layout) -> StorageResult<T>,
    {
        let _guard = self.inner.write_lock.lock();
        f(&self.inner.layout)
    }

    // ==================== Blobs ====================

    /// Store a database file and return its digest.
    pub fn put_blob(&self, bytes: &[u8]) -> StorageResult<BlobId> {
        self.inner.blobs.put(bytes)
    }

    pub fn get_blob(&self, id: &BlobId) -> StorageResult<Vec<u8>> {
        self.inner.blobs.get(id)
    }

    pub fn contains_blob(&self, id: &BlobId) -> bool {
        self.inner.blobs.contains(id)
    }

    /// Re-hash a stored blob; `CorruptedData` if it no longer matches.
    pub fn verify_blob(&self, id: &BlobId) -> StorageResult<()> {
        self.inner.blobs.verify(id)
    }

    /// Name, size and modification time of every stored database file.
    pub fn list_databases(&self) -> StorageResult<Vec<BlobMetadata>> {
        self.inner.blobs.list()
    }

    // ==================== Trees ====================

    /// Persist a tree whose entries all name stored objects.
    ///
    /// Database entries must be in the blob store and nested trees must
    /// already have been put.
    pub fn put_tree(&self, tree: &Tree) -> StorageResult<TreeId> {
        let layout = &self.inner.layout;
        for entry in tree.entries() {
            match entry.entry_type {
                TreeEntryType::Database => {
                    let blob = BlobId::new(entry.digest);
                    if !self.contains_blob(&blob) {
                        return Err(StorageError::BlobNotFound(blob));
                    }
                }
                TreeEntryType::Tree => {
                    let sub = TreeId::new(entry.digest);
                    if !layout.tree_path(&sub).is_file() {
                        return Err(StorageError::TreeNotFound(sub));
                    }
                }
            }
        }
        tree::write_tree(layout, tree)
    }

    pub fn get_tree(&self, id: TreeId) -> StorageResult<Tree> {
        tree::read_tree(&self.inner.layout, id)
    }

    // ==================== Index ====================

    /// The full commit history, in append order.
    pub fn history(&self) -> StorageResult<Vec<Commit>> {
        index::load_index(&self.inner.layout)
    }

    /// Replace the whole index.
    pub fn save_index(&self, commits: &[Commit]) -> StorageResult<()> {
        self.with_write_lock(|layout| index::save_index(layout, commits))
    }

    pub fn find_commit(&self, id: CommitId) -> StorageResult<Commit> {
        let history = self.history()?;
        index::find_commit(&history, &id)
            .cloned()
            .ok_or(StorageError::CommitNotFound(id))
    }

    /// Add a commit to the index.
    ///
    /// The commit's id must match its content, its tree must be stored and
    /// its parent must already be indexed. Appending an indexed commit
    /// again is a no-op; the return value says whether the index changed.
    pub fn append_to_index(&self, commit: Commit) -> StorageResult<bool> {
        self.with_write_lock(|layout| {
            let mut history = index::load_index(layout)?;
            Self::check_commit(layout, &history, &commit)?;
            let id = commit.id;
            if !index::append_commit(&mut history, commit) {
                return Ok(false);
            }
            index::save_index(layout, &history)?;
            debug!(commit = %id, "commit indexed");
            Ok(true)
        })
    }

    fn check_commit(layout: &Layout, history: &[Commit], commit: &Commit) -> StorageResult<()> {
        if !commit.verify() {
            return Err(StorageError::CorruptedData {
                path: layout.index_path(),
                reason: format!("commit {} does not hash to its id", commit.id),
            });
        }
        if !layout.tree_path(&commit.tree).is_file() {
            return Err(StorageError::TreeNotFound(commit.tree));
        }
        if let Some(parent) = commit.parent() {
            if index::find_commit(history, &parent).is_none() {
                return Err(StorageError::CommitNotFound(parent));
            }
        }
        Ok(())
    }

    /// First-parent history from `from` back to the root, newest first.
    pub fn log(&self, from: CommitId) -> StorageResult<Vec<Commit>> {
        index::ancestry(&self.history()?, from)
    }

    // ==================== Branches ====================

    pub fn branches(&self) -> StorageResult<Vec<Branch>> {
        refs::load_branches(&self.inner.layout)
    }

    /// Replace the whole branch set.
    pub fn save_branches(&self, branches: &[Branch]) -> StorageResult<()> {
        self.with_write_lock(|layout| refs::save_branches(layout, branches))
    }

    pub fn resolve_branch(&self, name: &BranchName) -> StorageResult<CommitId> {
        let branches = self.branches()?;
        refs::find_branch(&branches, name)
            .map(|b| b.commit)
            .ok_or_else(|| StorageError::BranchNotFound(name.to_string()))
    }

    pub fn branch_exists(&self, name: &BranchName) -> StorageResult<bool> {
        Ok(refs::find_branch(&self.branches()?, name).is_some())
    }

    /// Create a branch at an indexed commit; fails if the name is taken.
    pub fn create_branch(&self, name: &BranchName, commit: CommitId) -> StorageResult<()> {
        self.with_write_lock(|layout| {
            let mut branches = refs::load_branches(layout)?;
            if refs::find_branch(&branches, name).is_some() {
                return Err(StorageError::BranchAlreadyExists(name.to_string()));
            }
            Self::check_indexed(layout, commit)?;
            refs::upsert_branch(&mut branches, name, commit);
            refs::save_branches(layout, &branches)
        })
    }

    /// Point a branch at an indexed commit, creating it if needed.
    ///
    /// Returns the previous tip.
    pub fn set_branch(
        &self,
        name: &BranchName,
        commit: CommitId,
    ) -> StorageResult<Option<CommitId>> {
        self.with_write_lock(|layout| {
            Self::check_indexed(layout, commit)?;
            let mut branches = refs::load_branches(layout)?;
            let previous = refs::upsert_branch(&mut branches, name, commit);
            refs::save_branches(layout, &branches)?;
            debug!(branch = %name, commit = %commit, "branch moved");
            Ok(previous)
        })
    }

    /// Move a branch only if it still points at `expected`.
    pub fn update_branch_if_unchanged(
        &self,
        name: &BranchName,
        expected: CommitId,
        new_target: CommitId,
    ) -> StorageResult<()> {
        self.with_write_lock(|layout| {
            let mut branches = refs::load_branches(layout)?;
            let current = refs::find_branch(&branches, name)
                .map(|b| b.commit)
                .ok_or_else(|| StorageError::BranchNotFound(name.to_string()))?;

            if current != expected {
                return Err(StorageError::ConcurrentModification {
                    branch: name.to_string(),
                });
            }

            Self::check_indexed(layout, new_target)?;
            refs::upsert_branch(&mut branches, name, new_target);
            refs::save_branches(layout, &branches)
        })
    }

    pub fn delete_branch(&self, name: &BranchName) -> StorageResult<()> {
        self.with_write_lock(|layout| {
            let mut branches = refs::load_branches(layout)?;
            let before = branches.len();
            branches.retain(|b| &b.name != name);
            if branches.len() == before {
                return Err(StorageError::BranchNotFound(name.to_string()));
            }
            refs::save_branches(layout, &branches)
        })
    }

    fn check_indexed(layout: &Layout, commit: CommitId) -> StorageResult<()> {
        let history = index::load_index(layout)?;
        match index::find_commit(&history, &commit) {
            Some(_) => Ok(()),
            None => Err(StorageError::CommitNotFound(commit)),
        }
    }

    // ==================== Workflow ====================

    /// Record a new version of a database on a branch.
    ///
    /// Stores the bytes, builds a tree from the branch tip's tree with this
    /// database's entry replaced, commits on top of the tip (a root commit
    /// if the branch is new), indexes the commit and moves the branch.
    pub fn commit_database(
        &self,
        branch: &BranchName,
        change: DatabaseCommit<'_>,
    ) -> StorageResult<Commit> {
        let blob = self.put_blob(change.bytes)?;

        self.with_write_lock(|layout| {
            let mut branches = refs::load_branches(layout)?;
            let mut history = index::load_index(layout)?;

            let parent = refs::find_branch(&branches, branch).map(|b| b.commit);
            let mut builder = match parent {
                Some(tip) => {
                    let tip = index::find_commit(&history, &tip)
                        .ok_or(StorageError::CommitNotFound(tip))?;
                    TreeBuilder::from_tree(&tree::read_tree(layout, tip.tree)?)
                }
                None => TreeBuilder::new(),
            };
            builder.insert(TreeEntry::database(change.name, blob))?;
            let tree = builder.build();
            tree::write_tree(layout, &tree)?;

            let mut commit = CommitBuilder::new()
                .tree(tree.id())
                .maybe_parent(parent)
                .author(change.author)
                .message(change.message)
                .timestamp(change.timestamp.unwrap_or_else(|| Utc::now().trunc_subsecs(0)));
            if let Some(committer) = change.committer {
                commit = commit.committer(committer);
            }
            let commit = commit.build()?;

            index::append_commit(&mut history, commit.clone());
            index::save_index(layout, &history)?;
            refs::upsert_branch(&mut branches, branch, commit.id);
            refs::save_branches(layout, &branches)?;

            debug!(
                branch = %branch,
                commit = %commit.id,
                database = change.name,
                blob = %blob,
                "database committed"
            );
            Ok(commit)
        })
    }

    /// The bytes of a database as of a branch's tip.
    pub fn checkout(&self, branch: &BranchName, name: &str) -> StorageResult<Vec<u8>> {
        let tip = self.resolve_branch(branch)?;
        self.database_at(tip, name)
    }

    /// The bytes of a database as of a commit.
    pub fn database_at(&self, commit: CommitId, name: &str) -> StorageResult<Vec<u8>> {
        let commit = self.find_commit(commit)?;
        let tree = self.get_tree(commit.tree)?;
        let blob = tree.database(name).ok_or_else(|| StorageError::EntryNotFound {
            tree: tree.id(),
            name: name.to_string(),
        })?;
        self.get_blob(&blob)
    }
}

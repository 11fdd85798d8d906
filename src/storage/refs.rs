//! Branch persistence.
//!
//! Branches are the only mutable part of the model: named pointers to a
//! commit. The full set lives in `<root>/branches` as pretty JSON and is
//! rewritten as a whole on every save.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::layout::{self, Layout};
use crate::storage::types::{BranchName, CommitId};

/// a named pointer to a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: BranchName,
    pub commit: CommitId,
}

impl Branch {
    pub fn new(name: BranchName, commit: CommitId) -> Self {
        Self { name, commit }
    }
}

/// Write the whole branch set, replacing what was there.
pub fn save_branches(layout: &Layout, branches: &[Branch]) -> StorageResult<()> {
    layout::ensure_dir(layout.root())?;
    let bytes = serde_json::to_vec_pretty(branches).map_err(|e| {
        error!(err = %e, "failed to serialise branches");
        StorageError::Serialization(e)
    })?;
    layout::write_atomic(&layout.branches_path(), &bytes)?;
    debug!(count = branches.len(), "branches saved");
    Ok(())
}

/// Read the branch set. A store that never saved branches has none.
pub fn load_branches(layout: &Layout) -> StorageResult<Vec<Branch>> {
    match layout::read_optional(&layout.branches_path())? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

/// Find a branch by name in a loaded set.
pub fn find_branch<'a>(branches: &'a [Branch], name: &BranchName) -> Option<&'a Branch> {
    branches.iter().find(|b| &b.name == name)
}

/// Point `name` at `commit`, adding the branch if it is new.
///
/// Returns the previous tip, if any.
pub fn upsert_branch(
    branches: &mut Vec<Branch>,
    name: &BranchName,
    commit: CommitId,
) -> Option<CommitId> {
    match branches.iter_mut().find(|b| &b.name == name) {
        Some(branch) => Some(std::mem::replace(&mut branch.commit, commit)),
        None => {
            branches.push(Branch::new(name.clone(), commit));
            None
        }
    }
}

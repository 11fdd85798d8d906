//! The commit index: ordered history persisted in `<root>/index`.
//!
//! Like the branch file, the index is pretty JSON rewritten whole on
//! every save. Commits are kept in the order they were appended, so a
//! parent always comes before its children.

use tracing::{debug, error};

use crate::storage::commit::Commit;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::layout::{self, Layout};
use crate::storage::types::CommitId;

/// Write the whole index, replacing what was there.
pub fn save_index(layout: &Layout, index: &[Commit]) -> StorageResult<()> {
    layout::ensure_dir(layout.root())?;
    let bytes = serde_json::to_vec_pretty(index).map_err(|e| {
        error!(err = %e, "failed to serialise index");
        StorageError::Serialization(e)
    })?;
    layout::write_atomic(&layout.index_path(), &bytes)?;
    debug!(count = index.len(), "index saved");
    Ok(())
}

/// Read the index. A store that never saved one has an empty history.
pub fn load_index(layout: &Layout) -> StorageResult<Vec<Commit>> {
    match layout::read_optional(&layout.index_path())? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

pub fn find_commit<'a>(index: &'a [Commit], id: &CommitId) -> Option<&'a Commit> {
    index.iter().find(|c| &c.id == id)
}

/// Append a commit unless one with the same id is already indexed.
///
/// Returns whether the index changed.
pub fn append_commit(index: &mut Vec<Commit>, commit: Commit) -> bool {
    if find_commit(index, &commit.id).is_some() {
        return false;
    }
    index.push(commit);
    true
}

/// Walk first parents from `from` back to the root, newest first.
///
/// Fails if `from` or any ancestor is missing from the index.
pub fn ancestry(index: &[Commit], from: CommitId) -> StorageResult<Vec<Commit>> {
    let mut log = Vec::new();
    let mut next = Some(from);

    while let Some(id) = next {
        // a well-formed history can't be longer than the index
        if log.len() > index.len() {
            return Err(StorageError::Internal(format!("parent cycle through {}", id)));
        }
        let commit = find_commit(index, &id).ok_or(StorageError::CommitNotFound(id))?;
        next = commit.parent();
        log.push(commit.clone());
    }

    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::CommitBuilder;
    use crate::storage::tree::tree_digest;
    use crate::storage::types::Signature;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn commit(parent: Option<CommitId>, message: &str) -> Commit {
        CommitBuilder::new()
            .tree(tree_digest(&[]))
            .maybe_parent(parent)
            .author(Signature::new("Alice", "a@x.com"))
            .timestamp(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .message(message)
            .build()
            .unwrap()
    }

    fn chain() -> Vec<Commit> {
        let first = commit(None, "first");
        let second = commit(Some(first.id), "second");
        let third = commit(Some(second.id), "third");
        vec![first, second, third]
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path().join("store"));
        let history = chain();

        save_index(&layout, &history).unwrap();

        let loaded = load_index(&layout).unwrap();
        assert_eq!(loaded, history);
        assert!(loaded.iter().all(Commit::verify));
    }

    #[test]
    fn test_empty_index() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());

        assert!(load_index(&layout).unwrap().is_empty());
        save_index(&layout, &[]).unwrap();
        assert!(load_index(&layout).unwrap().is_empty());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let history = chain();

        save_index(&layout, &history).unwrap();
        save_index(&layout, &history[..1]).unwrap();

        assert_eq!(load_index(&layout).unwrap(), history[..1].to_vec());
    }

    #[test]
    fn test_save_fails_when_root_is_a_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        std::fs::write(&root, b"not a directory").unwrap();
        let layout = Layout::new(&root);

        let result = save_index(&layout, &chain());
        assert!(matches!(result, Err(StorageError::CreateDir { path, .. }) if path == root));
        assert_eq!(std::fs::read(&root).unwrap(), b"not a directory");
    }

    #[test]
    fn test_save_fails_when_target_is_a_directory() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        std::fs::create_dir(layout.index_path()).unwrap();

        let result = save_index(&layout, &chain());
        let target = layout.index_path();
        assert!(matches!(result, Err(StorageError::Write { path, .. }) if path == target));
        assert!(layout.index_path().is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_save_keeps_previous_index() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        let layout = Layout::new(&root);
        let history = chain();
        save_index(&layout, &history[..1]).unwrap();

        std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o555)).unwrap();
        // permission bits don't bind a privileged user
        if std::fs::write(root.join("canary"), b"").is_ok() {
            std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = save_index(&layout, &history);
        std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(StorageError::Write { .. })));
        assert_eq!(load_index(&layout).unwrap(), history[..1].to_vec());
    }

    #[test]
    fn test_append_is_idempotent() {
        let mut index = Vec::new();
        let first = commit(None, "first");

        assert!(append_commit(&mut index, first.clone()));
        assert!(!append_commit(&mut index, first));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_ancestry() {
        let history = chain();
        let log = ancestry(&history, history[2].id).unwrap();

        let messages: Vec<_> = log.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_ancestry_missing_commit() {
        let history = chain();
        let result = ancestry(&history[1..], history[2].id);
        assert!(matches!(result, Err(StorageError::CommitNotFound(id)) if id == history[0].id));
    }
}

//! Commit records and their digests
//!
//! A commit ties a tree snapshot to its parent commit and provenance
//! metadata. Its id is the SHA-256 of this record:
//!
//! ```text
//! tree <hex tree>\n
//! parent <hex parent>\n                          (root commits omit this)
//! author <name> <<email>> <timestamp>\n
//! committer <name> <<email>> <timestamp>\n       (omitted without a committer email)
//! \n
//! <message>\0
//! ```
//!
//! Timestamps are rendered in UTC as `Wed Jan  1 00:00:00 UTC 2020`, so the
//! same instant always produces the same bytes regardless of locale.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{CommitId, Digest, Signature, TreeId};

/// strftime pattern for timestamps inside the hashed record
pub const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

/// render a timestamp the way it appears in the hashed record
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// an immutable commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub tree: TreeId,
    /// `None` (or the nil sentinel) marks a root commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<CommitId>,
    pub author: Signature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<Signature>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Commit {
    /// the parent, with the nil sentinel read as "no parent"
    pub fn parent(&self) -> Option<CommitId> {
        self.parent.filter(|p| !p.is_nil())
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// first line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }

    /// recompute the digest and compare it with the stored id
    pub fn verify(&self) -> bool {
        commit_digest(self) == self.id
    }
}

/// Serialize the hashed record of a commit. The `id` field is ignored.
fn encode_commit(commit: &Commit) -> Vec<u8> {
    let timestamp = format_timestamp(&commit.timestamp);
    let mut record = format!("tree {}\n", commit.tree.to_hex());

    if let Some(parent) = commit.parent() {
        record.push_str(&format!("parent {}\n", parent.to_hex()));
    }

    record.push_str(&format!(
        "author {} <{}> {}\n",
        commit.author.name, commit.author.email, timestamp
    ));

    if let Some(committer) = commit.committer.as_ref().filter(|c| !c.email.is_empty()) {
        record.push_str(&format!(
            "committer {} <{}> {}\n",
            committer.name, committer.email, timestamp
        ));
    }

    record.push('\n');
    record.push_str(&commit.message);

    let mut bytes = record.into_bytes();
    bytes.push(0);
    bytes
}

/// Digest of a commit's content. Pure; the `id` field does not take part.
pub fn commit_digest(commit: &Commit) -> CommitId {
    CommitId::new(Digest::of(&encode_commit(commit)))
}

/// builder for commits with a fluent interface
#[derive(Debug, Default)]
pub struct CommitBuilder {
    tree: Option<TreeId>,
    parent: Option<CommitId>,
    author: Option<Signature>,
    committer: Option<Signature>,
    timestamp: Option<DateTime<Utc>>,
    message: String,
}

impl CommitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree: TreeId) -> Self {
        self.tree = Some(tree);
        self
    }

    /// set the parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// set or clear the parent commit
    pub fn maybe_parent(mut self, parent: Option<CommitId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn author(mut self, author: Signature) -> Self {
        self.author = Some(author);
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    /// set the commit time; defaults to now, truncated to whole seconds
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// create the commit and compute its id
    pub fn build(self) -> StorageResult<Commit> {
        let tree = self
            .tree
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;
        let author = self
            .author
            .ok_or_else(|| StorageError::Internal("commit requires an author".to_string()))?;

        let mut commit = Commit {
            id: CommitId::NIL,
            tree,
            parent: self.parent.filter(|p| !p.is_nil()),
            author,
            committer: self.committer,
            timestamp: self.timestamp.unwrap_or_else(|| Utc::now().trunc_subsecs(0)),
            message: self.message,
        };
        commit.id = commit_digest(&commit);
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const GOLDEN_TREE: &str = "df2e6cfc06b8a4474825a3e29850dfd19bf4f7b0883ec7c908a575021c076c85";
    const GOLDEN_ROOT: &str = "ebd242e3d9c3d75140c6c5946d8df210a35b579f7bbff6d98096246305a6c061";

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    fn root_commit() -> Commit {
        CommitBuilder::new()
            .tree(TreeId::from_hex(GOLDEN_TREE).unwrap())
            .author(Signature::new("Alice", "a@x.com"))
            .timestamp(new_year())
            .message("init")
            .build()
            .unwrap()
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(&new_year()), "Wed Jan  1 00:00:00 UTC 2020");
        let later = Utc.with_ymd_and_hms(2021, 11, 23, 14, 5, 9).unwrap();
        assert_eq!(format_timestamp(&later), "Tue Nov 23 14:05:09 UTC 2021");
    }

    #[test]
    fn test_golden_root_commit() {
        let commit = root_commit();
        assert_eq!(commit.id.to_hex(), GOLDEN_ROOT);
        assert!(commit.is_root());
        assert!(commit.verify());
    }

    #[test]
    fn test_record_layout() {
        let commit = root_commit();
        let expected = format!(
            "tree {}\nauthor Alice <a@x.com> Wed Jan  1 00:00:00 UTC 2020\n\ninit\0",
            GOLDEN_TREE
        );
        assert_eq!(encode_commit(&commit), expected.into_bytes());
    }

    #[test]
    fn test_digest_is_deterministic() {
        let commit = root_commit();
        assert_eq!(commit_digest(&commit), commit_digest(&commit.clone()));
        assert_eq!(root_commit().id, commit.id);
    }

    #[test]
    fn test_nil_parent_equals_no_parent() {
        let mut commit = root_commit();
        let without = commit_digest(&commit);

        commit.parent = Some(CommitId::NIL);
        assert_eq!(commit_digest(&commit), without);
        assert!(commit.is_root());
    }

    #[test]
    fn test_parent_changes_digest() {
        let root = root_commit();
        let child = CommitBuilder::new()
            .tree(root.tree)
            .parent(root.id)
            .author(Signature::new("Alice", "a@x.com"))
            .committer(Signature::new("Bob", "b@x.com"))
            .timestamp(Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap())
            .message("second")
            .build()
            .unwrap();

        assert_eq!(child.parent(), Some(root.id));
        assert_eq!(
            child.id.to_hex(),
            "67ecb81f4a2bef4a4da5e4115a05dde0ae684e5674a2cdff88308f74582cc5fe"
        );
    }

    #[test]
    fn test_empty_committer_email_equals_no_committer() {
        let mut commit = root_commit();
        let without = commit_digest(&commit);

        commit.committer = Some(Signature::new("Bob", ""));
        assert_eq!(commit_digest(&commit), without);

        commit.committer = Some(Signature::new("Bob", "b@x.com"));
        assert_ne!(commit_digest(&commit), without);
    }

    #[test]
    fn test_id_field_is_not_hashed() {
        let mut commit = root_commit();
        commit.id = CommitId::NIL;
        assert_eq!(commit_digest(&commit).to_hex(), GOLDEN_ROOT);
        assert!(!commit.verify());
    }

    #[test]
    fn test_builder_requires_tree_and_author() {
        let no_tree = CommitBuilder::new()
            .author(Signature::new("Alice", "a@x.com"))
            .build();
        assert!(matches!(no_tree, Err(StorageError::Internal(_))));

        let no_author = CommitBuilder::new()
            .tree(TreeId::from_hex(GOLDEN_TREE).unwrap())
            .build();
        assert!(matches!(no_author, Err(StorageError::Internal(_))));
    }

    #[test]
    fn test_builder_defaults_to_whole_second_now() {
        let commit = CommitBuilder::new()
            .tree(TreeId::from_hex(GOLDEN_TREE).unwrap())
            .author(Signature::new("Alice", "a@x.com"))
            .build()
            .unwrap();
        assert_eq!(commit.timestamp.timestamp_subsec_nanos(), 0);
        assert!(commit.verify());
    }

    #[test]
    fn test_summary() {
        let mut commit = root_commit();
        commit.message = "load nightly snapshot\n\nimported from backup".to_string();
        assert_eq!(commit.summary(), "load nightly snapshot");
    }

    #[test]
    fn test_json_form() {
        let commit = root_commit();
        let json = serde_json::to_value(&commit).unwrap();

        assert_eq!(json["id"], GOLDEN_ROOT);
        assert_eq!(json["tree"], GOLDEN_TREE);
        assert!(json.get("parent").is_none());
        assert!(json.get("committer").is_none());

        let back: Commit = serde_json::from_value(json).unwrap();
        assert_eq!(back, commit);
        assert!(back.verify());
    }
}

//! storage layer for dbstore
//!
//! This module captures mutable database files as an immutable,
//! hash-linked history. Every object is named by the SHA-256 of its
//! content, so identical input always yields the identical id.
//!
//!  # Architecture
//!
//! ```text
//!        raw database bytes
//!               │
//!               ▼
//!        ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!        │    blob     │ ────▶ │    tree     │ ────▶ │   commit    │
//!        │  (dbs/…)    │       │ (snapshot)  │       │  (history)  │
//!        └─────────────┘       └─────────────┘       └─────────────┘
//!                                                      │         │
//!                                                      ▼         ▼
//!                                               ┌──────────┐ ┌──────────┐
//!                                               │  index   │ │   refs   │
//!                                               │ (ordered)│ │(branches)│
//!                                               └──────────┘ └──────────┘
//! ```
//!
//! [`Store`] wires these together around one storage root; the free
//! functions in each module work on a [`Layout`] directly.
//!
//! # Usage
//!
//! ```ignore
//! use dbstore::storage::{BranchName, DatabaseCommit, Signature, Store};
//!
//! let store = Store::open("./.dbstore")?;
//! let main = BranchName::main();
//!
//! let commit = store.commit_database(
//!     &main,
//!     DatabaseCommit::new("app.sqlite", &bytes, Signature::new("Alice", "a@x.com"), "nightly"),
//! )?;
//!
//! let restored = store.checkout(&main, "app.sqlite")?;
//! ```

mod blob;
mod commit;
mod config;
mod error;
mod index;
mod layout;
mod refs;
mod store;
mod tree;
mod types;

// Re-export public API
pub use blob::{BlobMetadata, BlobStore};
pub use commit::{commit_digest, format_timestamp, Commit, CommitBuilder, TIMESTAMP_FORMAT};
pub use config::StoreConfig;
pub use error::{StorageError, StorageResult};
pub use index::{ancestry, append_commit, find_commit, load_index, save_index};
pub use layout::Layout;
pub use refs::{find_branch, load_branches, save_branches, upsert_branch, Branch};
pub use store::{DatabaseCommit, Store};
pub use tree::{read_tree, tree_digest, write_tree, Tree, TreeBuilder, TreeEntry, TreeEntryType};
pub use types::{BlobId, BranchName, CommitId, Digest, InvalidNameError, Signature, TreeId};

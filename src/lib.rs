//! dbstore - a content-addressed version store for database files
//!
//! Database files are stored as deduplicated blobs keyed by their SHA-256
//! digest. Snapshots are captured as trees, history as hash-linked commits,
//! and branches are named, mutable pointers into that history.
//!
//! # Example
//!
//! ```no_run
//! use dbstore::storage::{BranchName, DatabaseCommit, Signature, Store};
//!
//! let store = Store::open("./.dbstore").unwrap();
//! let bytes = std::fs::read("app.sqlite").unwrap();
//! let author = Signature::new("Alice", "a@x.com");
//!
//! let change = DatabaseCommit::new("app.sqlite", &bytes, author, "init");
//! let commit = store.commit_database(&BranchName::main(), change).unwrap();
//! println!("{}", commit.id);
//! ```

pub mod storage;

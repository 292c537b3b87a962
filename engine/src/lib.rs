//! # Pakhuis Engine
//!
//! The pure core of a replicated JSON document store.
//!
//! This crate holds everything about documents that does not need IO:
//! revisions, structural patches, change-log entries, the search index and
//! the reconciliation rules for changes pulled from a peer. The server crate
//! owns persistence, HTTP and the sync loop and drives this crate.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of files, network, or clocks
//! - **Deterministic**: Same inputs always produce same outputs
//! - **Plan, then commit**: mutations are computed against a snapshot of one
//!   document and only become visible once the caller has persisted them
//!
//! ## Core Concepts
//!
//! ### Documents
//!
//! A [`Document`] is a JSON body under a caller-assigned id with a revision
//! that starts at 1 and grows by one on every mutation. Deletes leave a
//! tombstone so they replicate.
//!
//! ### Changes
//!
//! Every mutation appends a [`ChangeEntry`] to the change log: a [`Change`]
//! (create, structural [`Patch`], or delete) plus the revisions before and
//! after and the [`Origin`] of the write.
//!
//! ### Search Index
//!
//! The [`SearchIndex`] keeps equality buckets for a configured set of
//! [`JsonPointer`] paths, so conjunctive [`Query`]s never scan documents.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] decides how a remote entry lands locally. Conflicts
//! are settled by comparing [`WriteStamp`]s, so both peers pick the same
//! winner.
//!
//! ## Quick Start
//!
//! ```rust
//! use pakhuis_engine::{mutation, IndexedField, JsonPointer, Query, SearchIndex};
//! use serde_json::json;
//!
//! let status = JsonPointer::parse("/status").unwrap();
//! let mut index = SearchIndex::new(vec![IndexedField::eq(status.clone())]);
//!
//! let created = mutation::plan_create(None, "task-1", json!({"status": "open"}), 1000).unwrap();
//! assert_eq!(created.revision(), 1);
//! index.update(&created.document);
//!
//! let hits = index.search(&Query::new().equals(status, json!("open"))).unwrap();
//! assert_eq!(hits, vec!["task-1".to_string()]);
//! ```

pub mod change;
pub mod cursor;
pub mod document;
pub mod error;
pub mod index;
pub mod mutation;
pub mod patch;
pub mod pointer;
pub mod reconcile;
pub mod stamp;

// Re-export main types at crate root
pub use change::{Change, ChangeEntry, ChangeKind, NewChange, Origin};
pub use cursor::SyncCursor;
pub use document::{Document, SyncPoint};
pub use error::Error;
pub use index::{Constraint, IndexKey, IndexKind, IndexedField, Query, SearchIndex};
pub use mutation::Mutation;
pub use patch::Patch;
pub use pointer::JsonPointer;
pub use reconcile::{ConflictRecord, Outcome, Reconciler, Resolution};
pub use stamp::WriteStamp;

/// Type aliases for clarity
pub type DocumentId = String;
pub type NodeId = String;
pub type Revision = u64;
pub type Sequence = u64;
pub type Timestamp = u64;

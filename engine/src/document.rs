//! Document type: the latest body and revision metadata for one id.

use crate::{DocumentId, NodeId, Origin, Revision, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored document.
///
/// Deleted documents stay around as tombstones so deletions replicate and
/// revisions are never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Caller-assigned unique identifier
    pub id: DocumentId,
    /// The JSON body (the last live body for tombstones)
    pub body: Value,
    /// Revision, starting at 1 and bumped on every mutation
    pub revision: Revision,
    /// Time of the last mutation (milliseconds since epoch)
    pub updated_at: Timestamp,
    /// Tombstone flag
    pub deleted: bool,
    /// Where the last mutation came from
    #[serde(default)]
    pub origin: Origin,
    /// Last point at which this document and a peer's copy agreed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncPoint>,
}

/// A pair of revisions, one per side, at which both copies held the same
/// state.
///
/// Revisions are per store, so a remote entry is compared against the
/// peer-side revision recorded here rather than the local one. Any local
/// write bumps the local revision past `local_revision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPoint {
    pub peer: NodeId,
    pub peer_revision: Revision,
    pub local_revision: Revision,
}

impl SyncPoint {
    /// Whether an entry from `peer` written on top of `revision_before`
    /// extends this agreed state with no local write in between.
    pub fn continues(&self, peer: &str, revision_before: Revision, local: Revision) -> bool {
        self.peer == peer && self.peer_revision == revision_before && self.local_revision == local
    }
}

impl Document {
    /// Create a new document at revision 1.
    pub fn new(id: impl Into<DocumentId>, body: Value, timestamp: Timestamp) -> Self {
        Self {
            id: id.into(),
            body,
            revision: 1,
            updated_at: timestamp,
            deleted: false,
            origin: Origin::Local,
            sync: None,
        }
    }

    /// Check if the document is live (not a tombstone).
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// Replace the body, bumping the revision.
    pub fn update_body(&mut self, body: Value, timestamp: Timestamp) {
        self.body = body;
        self.deleted = false;
        self.revision += 1;
        self.updated_at = timestamp;
        self.origin = Origin::Local;
    }

    /// Turn the document into a tombstone, bumping the revision.
    pub fn mark_deleted(&mut self, timestamp: Timestamp) {
        self.deleted = true;
        self.revision += 1;
        self.updated_at = timestamp;
        self.origin = Origin::Local;
    }
}

/// Current revision of an optional document; 0 when it never existed.
pub fn revision_of(doc: Option<&Document>) -> Revision {
    doc.map(|d| d.revision).unwrap_or(0)
}

//! Change-log entry types.
//!
//! Every mutation of the store, local or replicated, is recorded as a
//! [`ChangeEntry`]. Entries are what peers pull from each other.

use crate::{Document, DocumentId, NodeId, Patch, Revision, Sequence, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a change came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Origin {
    /// Written through this store's own API
    #[default]
    Local,
    /// Applied from a peer's change log
    Replicated { peer: NodeId },
}

impl Origin {
    /// Origin for a change pulled from `peer`.
    pub fn replicated(peer: impl Into<NodeId>) -> Self {
        Origin::Replicated { peer: peer.into() }
    }

    /// The peer a replicated change came from.
    pub fn peer(&self) -> Option<&str> {
        match self {
            Origin::Local => None,
            Origin::Replicated { peer } => Some(peer),
        }
    }

    /// Whether this change was replicated from `node`.
    pub fn is_from(&self, node: &str) -> bool {
        self.peer() == Some(node)
    }
}

/// Kind of change, as stored in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Patch,
    Delete,
}

impl ChangeKind {
    /// Lowercase name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Patch => "patch",
            ChangeKind::Delete => "delete",
        }
    }

    /// Parse a stored name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeKind::Create),
            "patch" => Some(ChangeKind::Patch),
            "delete" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// The content of a change: full body for creates, a patch for edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Change {
    Create { body: Value },
    Patch { patch: Patch },
    Delete,
}

impl Change {
    /// The kind of this change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Create { .. } => ChangeKind::Create,
            Change::Patch { .. } => ChangeKind::Patch,
            Change::Delete => ChangeKind::Delete,
        }
    }

    /// The diff payload as stored: the body for creates, the patch
    /// operations for edits, nothing for deletes.
    pub fn diff(&self) -> Option<Value> {
        match self {
            Change::Create { body } => Some(body.clone()),
            Change::Patch { patch } => serde_json::to_value(patch).ok(),
            Change::Delete => None,
        }
    }

    /// Rebuild a change from its stored kind and diff payload.
    pub fn from_parts(kind: ChangeKind, diff: Option<Value>) -> crate::error::Result<Self> {
        match kind {
            ChangeKind::Create => Ok(Change::Create {
                body: diff.unwrap_or(Value::Null),
            }),
            ChangeKind::Patch => Ok(Change::Patch {
                patch: Patch::from_value(diff.unwrap_or(Value::Array(Vec::new())))?,
            }),
            ChangeKind::Delete => Ok(Change::Delete),
        }
    }
}

/// A change that has not been assigned a sequence number yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChange {
    pub document_id: DocumentId,
    pub change: Change,
    pub revision_before: Revision,
    pub revision_after: Revision,
    pub origin: Origin,
    pub timestamp: Timestamp,
    /// Body after a patch was applied
    pub body_after: Option<Value>,
}

impl NewChange {
    /// Attach the sequence number assigned by the log.
    pub fn into_entry(self, sequence: Sequence) -> ChangeEntry {
        ChangeEntry {
            sequence,
            document_id: self.document_id,
            change: self.change,
            revision_before: self.revision_before,
            revision_after: self.revision_after,
            origin: self.origin,
            timestamp: self.timestamp,
            body_after: self.body_after,
        }
    }
}

/// An entry of the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Position in the log, contiguous and strictly increasing
    pub sequence: Sequence,
    /// The document this change applies to
    pub document_id: DocumentId,
    /// What changed
    #[serde(flatten)]
    pub change: Change,
    /// Document revision before the change (0 if it did not exist)
    pub revision_before: Revision,
    /// Document revision after the change
    pub revision_after: Revision,
    /// Where the change came from
    pub origin: Origin,
    /// When the change was made (milliseconds since epoch)
    pub timestamp: Timestamp,
    /// Body the patch produced on the writing node. Only patches carry it;
    /// creates hold the full body already.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_after: Option<Value>,
}

impl ChangeEntry {
    /// Whether `doc` is in the state this entry left the document in on
    /// the writing node. Unknown for patches without a stored body.
    pub fn reflected_by(&self, doc: &Document) -> bool {
        match &self.change {
            Change::Create { body } => doc.is_active() && doc.body == *body,
            Change::Patch { .. } => {
                doc.is_active() && self.body_after.as_ref() == Some(&doc.body)
            }
            Change::Delete => doc.deleted,
        }
    }
}

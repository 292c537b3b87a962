//! Reconciliation of remote change-log entries against local documents.
//!
//! This is where replication decides what to do with each pulled entry.
//! The decision is pure: given the local document and a remote entry it
//! produces an [`Outcome`], which the store then persists.
//!
//! Revisions are assigned per store, so each document keeps a [`SyncPoint`]:
//! the peer's revision and the local revision at which both copies last
//! held the same state.
//!
//! # Algorithm
//!
//! 1. Entries that originated here and came back only refresh the sync
//!    point, when the local copy still matches them
//! 2. Entries at or below the peer revision of the sync point are no-ops
//! 3. Entries whose end state the local copy already has refresh the sync
//!    point
//! 4. If the entry was written on top of the sync point and nothing was
//!    written locally since, apply it
//! 5. Otherwise it is a conflict: the later [`WriteStamp`] wins and the
//!    winner's body is taken as a whole

use crate::{
    document::{revision_of, SyncPoint},
    mutation::plan_replicated,
    ChangeEntry, Document, DocumentId, Mutation, NodeId, Revision, Sequence, Timestamp,
    WriteStamp,
};
use serde::{Deserialize, Serialize};

/// How a conflict was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The local state was kept and the remote entry discarded
    LocalWins,
    /// The remote entry was applied over the local state
    RemoteWins,
}

impl Resolution {
    /// Name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::LocalWins => "local_wins",
            Resolution::RemoteWins => "remote_wins",
        }
    }

    /// Parse a stored name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local_wins" => Some(Resolution::LocalWins),
            "remote_wins" => Some(Resolution::RemoteWins),
            _ => None,
        }
    }
}

/// A detected conflict, kept for operator inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// The contested document
    pub document_id: DocumentId,
    /// The peer the remote entry came from
    pub peer: NodeId,
    /// Sequence of the remote entry in the peer's log
    pub remote_sequence: Sequence,
    /// Local revision when the conflict was detected
    pub local_revision: Revision,
    /// Revision the remote entry produced on the peer
    pub remote_revision: Revision,
    /// Which side won
    pub resolution: Resolution,
    /// When the conflict was detected
    pub timestamp: Timestamp,
}

/// What to do with one remote entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The entry came from this node in the first place
    RoundTrip,
    /// The local document already reflects the entry
    AlreadyApplied,
    /// Both copies hold the same state; only the sync point of the
    /// document moves
    InSync(Document),
    /// The entry applies cleanly
    Apply(Mutation),
    /// The entry conflicts with local state; `mutation` is set when the
    /// remote side won
    Conflict {
        record: ConflictRecord,
        mutation: Option<Mutation>,
    },
}

impl Outcome {
    /// The mutation to persist, if any.
    pub fn mutation(&self) -> Option<&Mutation> {
        match self {
            Outcome::Apply(m) => Some(m),
            Outcome::Conflict { mutation, .. } => mutation.as_ref(),
            Outcome::RoundTrip | Outcome::AlreadyApplied | Outcome::InSync(_) => None,
        }
    }

    /// The document whose sync point alone changed, if any.
    pub fn in_sync(&self) -> Option<&Document> {
        match self {
            Outcome::InSync(doc) => Some(doc),
            _ => None,
        }
    }

    /// The conflict record, if any.
    pub fn conflict(&self) -> Option<&ConflictRecord> {
        match self {
            Outcome::Conflict { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Split into owned parts.
    pub fn into_parts(self) -> (Option<Mutation>, Option<ConflictRecord>) {
        match self {
            Outcome::Apply(m) => (Some(m), None),
            Outcome::Conflict { record, mutation } => (mutation, Some(record)),
            Outcome::RoundTrip | Outcome::AlreadyApplied | Outcome::InSync(_) => (None, None),
        }
    }
}

/// Reconciles entries pulled from one peer.
#[derive(Debug, Clone)]
pub struct Reconciler {
    local_node: NodeId,
    peer: NodeId,
}

impl Reconciler {
    /// Create a reconciler for entries from `peer` arriving at `local_node`.
    pub fn new(local_node: impl Into<NodeId>, peer: impl Into<NodeId>) -> Self {
        Self {
            local_node: local_node.into(),
            peer: peer.into(),
        }
    }

    /// The peer this reconciler handles.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Decide what `entry` does to `local`. `now` stamps conflict records.
    pub fn reconcile(
        &self,
        local: Option<&Document>,
        entry: &ChangeEntry,
        now: Timestamp,
    ) -> Outcome {
        if entry.origin.is_from(&self.local_node) {
            return match local {
                Some(doc) if entry.reflected_by(doc) => self.in_sync(doc, entry),
                _ => Outcome::RoundTrip,
            };
        }
        if self.already_applied(local, entry) {
            return Outcome::AlreadyApplied;
        }
        if let Some(doc) = local.filter(|d| entry.reflected_by(d)) {
            return self.in_sync(doc, entry);
        }

        let local_revision = revision_of(local);
        let clean = match local {
            None => entry.revision_before == 0,
            Some(doc) => doc.sync.as_ref().is_some_and(|point| {
                point.continues(&self.peer, entry.revision_before, doc.revision)
            }),
        };
        if clean {
            let revision = entry.revision_after.max(local_revision + 1);
            return Outcome::Apply(plan_replicated(
                local,
                entry,
                revision,
                self.sync_point(entry, revision),
            ));
        }

        let remote = WriteStamp::new(entry.timestamp, self.peer.clone());
        let remote_wins = match local {
            Some(doc) => remote.beats(&self.local_stamp(doc)),
            None => true,
        };

        let record = ConflictRecord {
            document_id: entry.document_id.clone(),
            peer: self.peer.clone(),
            remote_sequence: entry.sequence,
            local_revision,
            remote_revision: entry.revision_after,
            resolution: if remote_wins {
                Resolution::RemoteWins
            } else {
                Resolution::LocalWins
            },
            timestamp: now,
        };

        let mutation = remote_wins.then(|| {
            let revision = local_revision.max(entry.revision_after) + 1;
            plan_replicated(local, entry, revision, self.sync_point(entry, revision))
        });

        Outcome::Conflict { record, mutation }
    }

    fn sync_point(&self, entry: &ChangeEntry, local_revision: Revision) -> SyncPoint {
        SyncPoint {
            peer: self.peer.clone(),
            peer_revision: entry.revision_after,
            local_revision,
        }
    }

    fn in_sync(&self, doc: &Document, entry: &ChangeEntry) -> Outcome {
        let point = self.sync_point(entry, doc.revision);
        if doc.sync.as_ref() == Some(&point) {
            return Outcome::AlreadyApplied;
        }
        let mut doc = doc.clone();
        doc.sync = Some(point);
        Outcome::InSync(doc)
    }

    /// Stamp of the last write to `doc`, attributed to the node that made it.
    fn local_stamp(&self, doc: &Document) -> WriteStamp {
        let writer = doc.origin.peer().unwrap_or(&self.local_node);
        WriteStamp::new(doc.updated_at, writer)
    }

    /// Whether the sync point of `local` is already past `entry`.
    ///
    /// A create on top of nothing is never covered: after a purge the peer
    /// starts the document over at revision 1.
    fn already_applied(&self, local: Option<&Document>, entry: &ChangeEntry) -> bool {
        if entry.revision_before == 0 {
            return false;
        }
        local
            .and_then(|doc| doc.sync.as_ref())
            .is_some_and(|point| point.peer == self.peer && entry.revision_after <= point.peer_revision)
    }
}

//! Sync cursors: how far each peer's log has been applied locally.

use crate::{NodeId, Sequence, Timestamp};
use serde::{Deserialize, Serialize};

/// Replication progress for one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// The peer this cursor tracks
    pub peer_id: NodeId,
    /// Highest remote sequence applied (or deliberately skipped)
    pub last_applied_remote_sequence: Sequence,
    /// When the last sync attempt started
    pub last_attempt_timestamp: Option<Timestamp>,
    /// Error of the last attempt, cleared on success
    pub last_error: Option<String>,
}

impl SyncCursor {
    /// A fresh cursor at the start of the peer's log.
    pub fn new(peer_id: impl Into<NodeId>) -> Self {
        Self {
            peer_id: peer_id.into(),
            last_applied_remote_sequence: 0,
            last_attempt_timestamp: None,
            last_error: None,
        }
    }
}

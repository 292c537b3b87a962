//! Write stamps for last-write-wins ordering.
//!
//! Two peers that see the same pair of conflicting writes must pick the same
//! winner. Timestamps alone can tie, so the node id breaks ties.

use crate::{NodeId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// When and where a write happened.
///
/// Ordering rules:
/// 1. Later timestamp wins
/// 2. If timestamps are equal, lexicographically higher node id wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStamp {
    /// Wall-clock time of the write (milliseconds since epoch)
    pub timestamp: Timestamp,
    /// Node that made the write
    pub node_id: NodeId,
}

impl WriteStamp {
    /// Create a stamp.
    pub fn new(timestamp: Timestamp, node_id: impl Into<NodeId>) -> Self {
        Self {
            timestamp,
            node_id: node_id.into(),
        }
    }

    /// Whether this stamp wins against `other`.
    pub fn beats(&self, other: &WriteStamp) -> bool {
        self > other
    }
}

impl Ord for WriteStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Equal => self.node_id.cmp(&other.node_id),
            other => other,
        }
    }
}

impl PartialOrd for WriteStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_timestamp_wins() {
        let a = WriteStamp::new(10, "z");
        let b = WriteStamp::new(20, "a");
        assert!(b.beats(&a));
        assert!(!a.beats(&b));
    }

    #[test]
    fn node_id_breaks_ties() {
        let a = WriteStamp::new(10, "node-a");
        let b = WriteStamp::new(10, "node-b");
        assert!(b.beats(&a));
        assert!(!a.beats(&b));
    }

    #[test]
    fn equal_stamps_do_not_beat() {
        let a = WriteStamp::new(10, "n");
        assert!(!a.beats(&a.clone()));
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }
}

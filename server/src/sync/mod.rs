//! Replication from configured peers.

mod engine;
mod peer;

pub use engine::*;
pub use peer::*;

use crate::config::PeerConfig;
use crate::error::SyncError;
use crate::store::Store;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Read-only view of every engine's status, for the HTTP API.
#[derive(Debug, Clone, Default)]
pub struct SyncBoard {
    handles: Arc<Vec<StatusHandle>>,
}

impl SyncBoard {
    pub fn new(handles: Vec<StatusHandle>) -> Self {
        Self {
            handles: Arc::new(handles),
        }
    }

    /// A snapshot of every peer's status.
    pub fn snapshot(&self) -> Vec<PeerStatus> {
        self.handles.iter().map(|h| h.read().clone()).collect()
    }
}

/// The running sync engines.
pub struct SyncManager {
    board: SyncBoard,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SyncManager {
    /// Spawn one engine per peer.
    pub fn start(store: &Store, peers: &[PeerConfig]) -> Result<Self, SyncError> {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(peers.len());
        let mut tasks = Vec::with_capacity(peers.len());

        for config in peers {
            let source = HttpPeer::new(config)?;
            let engine = SyncEngine::new(store.clone(), source, SyncSettings::from(config));
            handles.push(engine.status());
            tasks.push(tokio::spawn(engine.run(cancel.child_token())));
        }

        Ok(Self {
            board: SyncBoard::new(handles),
            tasks,
            cancel,
        })
    }

    pub fn board(&self) -> SyncBoard {
        self.board.clone()
    }

    /// Stop every engine and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Sync task panicked");
            }
        }
    }
}

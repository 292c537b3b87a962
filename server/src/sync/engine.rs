//! The per-peer sync engine.
//!
//! Each configured peer gets one engine running on its own task. A cycle
//! pulls pages of the peer's change log after the persisted cursor and
//! hands every entry to [`Store::apply_remote`], which reconciles it and
//! advances the cursor in the same transaction.

use super::peer::ChangeSource;
use crate::config::PeerConfig;
use crate::error::SyncError;
use crate::store::Store;
use pakhuis_engine::{NodeId, Outcome, Reconciler, Sequence, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where an engine is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Pulling,
    Applying,
    Error,
}

/// Observable state of one peer's engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub peer_id: NodeId,
    pub state: SyncState,
    /// Last remote sequence applied
    pub cursor: Sequence,
    pub last_attempt: Option<Timestamp>,
    pub last_error: Option<String>,
    /// Delay before the next cycle
    #[serde(with = "humantime_serde")]
    pub next_delay: Duration,
}

/// Shared view of a [`PeerStatus`].
pub type StatusHandle = Arc<RwLock<PeerStatus>>;

/// Timing and batching for one engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub max_backoff: Duration,
}

impl From<&PeerConfig> for SyncSettings {
    fn from(config: &PeerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            batch_size: config.batch_size,
            max_backoff: config.max_backoff,
        }
    }
}

/// Counts from one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pulled: usize,
    pub applied: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub cursor: Sequence,
}

impl CycleReport {
    fn tally(&mut self, outcome: &Outcome) {
        self.pulled += 1;
        match outcome {
            Outcome::Apply(_) => self.applied += 1,
            Outcome::RoundTrip | Outcome::AlreadyApplied | Outcome::InSync(_) => {
                self.skipped += 1
            }
            Outcome::Conflict { .. } => self.conflicts += 1,
        }
    }
}

/// Pulls from one peer and applies into the local store.
pub struct SyncEngine<S> {
    store: Store,
    source: S,
    reconciler: Reconciler,
    settings: SyncSettings,
    status: StatusHandle,
}

impl<S: ChangeSource> SyncEngine<S> {
    pub fn new(store: Store, source: S, settings: SyncSettings) -> Self {
        let peer = source.peer_id().to_string();
        let reconciler = Reconciler::new(store.node_id(), peer.clone());
        let status = Arc::new(RwLock::new(PeerStatus {
            peer_id: peer,
            state: SyncState::Idle,
            cursor: 0,
            last_attempt: None,
            last_error: None,
            next_delay: settings.poll_interval,
        }));
        Self {
            store,
            source,
            reconciler,
            settings,
            status,
        }
    }

    /// A handle that follows this engine's status.
    pub fn status(&self) -> StatusHandle {
        Arc::clone(&self.status)
    }

    fn peer(&self) -> &str {
        self.reconciler.peer()
    }

    fn set_state(&self, state: SyncState) {
        self.status.write().state = state;
    }

    /// Run one cycle: pull until the peer has nothing more, then record the
    /// attempt on the cursor.
    pub async fn sync_once(&self) -> Result<CycleReport, SyncError> {
        let started_at = self.store.now();
        let result = self.pull_all().await;

        let error = result.as_ref().err().map(|e| e.to_string());
        self.store
            .record_attempt(self.peer(), started_at, error.as_deref())
            .await?;

        let cursor = self.store.cursor(self.peer()).await?.last_applied_remote_sequence;
        {
            let mut status = self.status.write();
            status.cursor = cursor;
            status.last_attempt = Some(started_at);
            status.last_error = error;
            status.state = if result.is_ok() {
                SyncState::Idle
            } else {
                SyncState::Error
            };
        }
        result
    }

    async fn pull_all(&self) -> Result<CycleReport, SyncError> {
        let mut report = CycleReport::default();
        let mut cursor = self.store.cursor(self.peer()).await?.last_applied_remote_sequence;

        loop {
            self.set_state(SyncState::Pulling);
            let batch = self
                .source
                .fetch(cursor, self.settings.batch_size, self.store.node_id())
                .await?;

            if batch.node_id != self.peer() {
                return Err(SyncError::PeerProtocol {
                    peer: self.peer().to_string(),
                    reason: format!("peer reports node id {}", batch.node_id),
                });
            }

            self.set_state(SyncState::Applying);
            let mut progressed = false;
            for entry in &batch.entries {
                if entry.sequence <= cursor {
                    return Err(SyncError::PeerProtocol {
                        peer: self.peer().to_string(),
                        reason: format!(
                            "entry {} is not after cursor {}",
                            entry.sequence, cursor
                        ),
                    });
                }
                let outcome = self.store.apply_remote(&self.reconciler, entry).await?;
                report.tally(&outcome);
                cursor = entry.sequence;
                progressed = true;
            }

            if !batch.has_more || !progressed {
                break;
            }
        }

        report.cursor = cursor;
        if report.pulled > 0 {
            tracing::info!(
                peer = self.peer(),
                pulled = report.pulled,
                applied = report.applied,
                skipped = report.skipped,
                conflicts = report.conflicts,
                cursor,
                "Sync cycle finished"
            );
        }
        Ok(report)
    }

    /// Sync until `cancel` fires. A cycle in flight is finished before the
    /// engine stops.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(peer = self.peer(), "Sync engine started");
        let mut backoff = self.settings.poll_interval;

        loop {
            let delay = match self.sync_once().await {
                Ok(_) => {
                    backoff = self.settings.poll_interval;
                    self.settings.poll_interval
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(peer = self.peer(), error = %e, retry_in = ?backoff, "Sync failed");
                    } else {
                        tracing::error!(peer = self.peer(), error = %e, retry_in = ?backoff, "Sync failed");
                    }
                    let delay = backoff;
                    backoff = next_backoff(backoff, self.settings.max_backoff);
                    delay
                }
            };
            self.status.write().next_delay = delay;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!(peer = self.peer(), "Sync engine stopped");
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

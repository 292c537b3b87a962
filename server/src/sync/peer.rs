//! Sources of remote change-log entries.

use crate::config::PeerConfig;
use crate::error::SyncError;
use crate::store::{ChangeBatch, Store};
use pakhuis_engine::{NodeId, Sequence};
use std::future::Future;

/// Something a sync engine can pull change-log pages from.
pub trait ChangeSource: Send + Sync + 'static {
    /// The node id the source is expected to report.
    fn peer_id(&self) -> &str;

    /// Fetch entries with `sequence > since`. `ack_as` is this node's id,
    /// passed along so the source can record how far we have pulled.
    fn fetch(
        &self,
        since: Sequence,
        limit: u32,
        ack_as: &str,
    ) -> impl Future<Output = Result<ChangeBatch, SyncError>> + Send;
}

/// A peer reached over its HTTP API.
#[derive(Debug, Clone)]
pub struct HttpPeer {
    id: NodeId,
    base_url: String,
    client: reqwest::Client,
}

impl HttpPeer {
    pub fn new(config: &PeerConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::PeerUnreachable {
                peer: config.id.clone(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;
        Ok(Self {
            id: config.id.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn unreachable(&self, reason: impl ToString) -> SyncError {
        SyncError::PeerUnreachable {
            peer: self.id.clone(),
            reason: reason.to_string(),
        }
    }
}

impl ChangeSource for HttpPeer {
    fn peer_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, since: Sequence, limit: u32, ack_as: &str) -> Result<ChangeBatch, SyncError> {
        let url = format!("{}/changes", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("since", since.to_string()),
                ("limit", limit.to_string()),
                ("peer", ack_as.to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unreachable(format!("GET {} returned {}", url, status)));
        }

        response
            .json::<ChangeBatch>()
            .await
            .map_err(|e| SyncError::PeerProtocol {
                peer: self.id.clone(),
                reason: format!("undecodable change batch: {}", e),
            })
    }
}

/// Another store in the same process. Pulls go straight to its log.
impl ChangeSource for Store {
    fn peer_id(&self) -> &str {
        self.node_id()
    }

    async fn fetch(&self, since: Sequence, limit: u32, ack_as: &str) -> Result<ChangeBatch, SyncError> {
        Ok(self.changes(since, limit, Some(ack_as)).await?)
    }
}

//! Replication endpoints: the change feed peers pull from, and status.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use pakhuis_engine::{ConflictRecord, NodeId, Sequence};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::ChangeBatch;
use crate::sync::PeerStatus;
use crate::AppState;

const MAX_PAGE: u32 = 1000;

/// Query parameters for the change feed.
#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    #[serde(default)]
    pub since: Sequence,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Node id of the pulling peer, recorded as an acknowledgement
    pub peer: Option<NodeId>,
}

fn default_limit() -> u32 {
    100
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub node_id: NodeId,
    pub peers: Vec<PeerStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictsQuery {
    pub document_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/changes", get(changes))
        .route("/sync/status", get(status))
        .route("/sync/conflicts", get(conflicts))
}

/// GET /changes - Page through the change log.
async fn changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<ChangeBatch>> {
    let batch = state
        .store
        .changes(query.since, query.limit.min(MAX_PAGE), query.peer.as_deref())
        .await?;
    tracing::debug!(
        since = query.since,
        peer = query.peer.as_deref().unwrap_or("-"),
        returned = batch.entries.len(),
        "Served changes"
    );
    Ok(Json(batch))
}

/// GET /sync/status - State of every peer's sync engine.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        node_id: state.store.node_id().to_string(),
        peers: state.sync.snapshot(),
    })
}

/// GET /sync/conflicts - Recent conflict records.
async fn conflicts(
    State(state): State<AppState>,
    Query(query): Query<ConflictsQuery>,
) -> Result<Json<Vec<ConflictRecord>>> {
    let records = state
        .store
        .conflicts(query.document_id.as_deref(), query.limit.min(MAX_PAGE))
        .await?;
    Ok(Json(records))
}

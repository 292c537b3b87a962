//! Liveness and identity endpoints.

use axum::{extract::State, routing::get, Json, Router};
use pakhuis_engine::NodeId;
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub node_id: NodeId,
    /// Live documents held by this node
    pub documents: usize,
    /// Peers with a running sync engine
    pub peers: usize,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/", get(banner))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        node_id: state.store.node_id().to_string(),
        documents: state.store.list().len(),
        peers: state.sync.snapshot().len(),
    })
}

async fn banner(State(state): State<AppState>) -> String {
    format!("Pakhuis document store ({})", state.store.node_id())
}

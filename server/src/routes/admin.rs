//! Operator endpoints.

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::CompactionReport;
use crate::AppState;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Serialize)]
pub struct ReindexResponse {
    pub indexed: usize,
}

#[derive(Debug, Deserialize)]
pub struct CompactQuery {
    #[serde(default = "default_days")]
    pub days: u64,
}

fn default_days() -> u64 {
    30
}

/// Create admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/reindex", post(reindex))
        .route("/admin/compact", post(compact))
}

/// POST /admin/reindex - Rebuild the search index.
async fn reindex(State(state): State<AppState>) -> Json<ReindexResponse> {
    Json(ReindexResponse {
        indexed: state.store.rebuild(),
    })
}

/// POST /admin/compact?days=N - Drop acknowledged history older than N days.
async fn compact(
    State(state): State<AppState>,
    Query(query): Query<CompactQuery>,
) -> Result<Json<CompactionReport>> {
    let older_than = state
        .store
        .now()
        .saturating_sub(query.days.saturating_mul(DAY_MS));
    Ok(Json(state.store.compact(older_than).await?))
}

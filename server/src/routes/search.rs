//! Search endpoints.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use pakhuis_engine::{DocumentId, JsonPointer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::docs::DocumentResponse;
use crate::error::Result;
use crate::handlers::parse_search;
use crate::AppState;

/// Search response.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub ids: Vec<DocumentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<DocumentResponse>>,
}

#[derive(Debug, Deserialize)]
pub struct ValuesQuery {
    pub field: JsonPointer,
}

#[derive(Debug, Serialize)]
pub struct ValuesResponse {
    pub field: JsonPointer,
    pub values: Vec<Value>,
}

/// Create search routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(search))
        .route("/search/values", get(indexed_values))
}

/// GET /search?/field=value - Conjunctive equality search.
async fn search(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<SearchResponse>> {
    let request = parse_search(&params)?;

    if request.include_bodies {
        let docs = state.store.search_documents(&request.query)?;
        return Ok(Json(SearchResponse {
            ids: docs.iter().map(|d| d.id.clone()).collect(),
            documents: Some(docs.into_iter().map(DocumentResponse::from).collect()),
        }));
    }

    Ok(Json(SearchResponse {
        ids: state.store.search(&request.query)?,
        documents: None,
    }))
}

/// GET /search/values?field=/path - Distinct indexed values.
async fn indexed_values(
    State(state): State<AppState>,
    Query(query): Query<ValuesQuery>,
) -> Result<Json<ValuesResponse>> {
    let values = state.store.values(&query.field)?;
    Ok(Json(ValuesResponse {
        field: query.field,
        values,
    }))
}

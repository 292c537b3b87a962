//! Document endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use pakhuis_engine::{ChangeEntry, Document, DocumentId, Patch, Revision, Timestamp};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::handlers::IfMatch;
use crate::AppState;

/// Response for writes.
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub id: DocumentId,
    pub revision: Revision,
}

/// A document as returned to clients.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: DocumentId,
    pub revision: Revision,
    pub updated_at: Timestamp,
    pub body: Value,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            revision: doc.revision,
            updated_at: doc.updated_at,
            body: doc.body,
        }
    }
}

/// Response for listing.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub ids: Vec<DocumentId>,
}

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/docs", get(list_documents).post(create_document))
        .route(
            "/docs/{id}",
            get(get_document)
                .put(put_document)
                .patch(patch_document)
                .delete(delete_document),
        )
        .route("/docs/{id}/history", get(document_history))
}

/// PUT /docs/{id} - Create or replace a document.
async fn put_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    IfMatch(expected): IfMatch,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<WriteResponse>)> {
    let (revision, created) = state.store.put(&id, body, expected).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(WriteResponse { id, revision })))
}

/// POST /docs - Create a document under a generated id.
async fn create_document(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<WriteResponse>)> {
    let id = uuid::Uuid::new_v4().to_string();
    let revision = state.store.create(&id, body).await?;
    Ok((StatusCode::CREATED, Json(WriteResponse { id, revision })))
}

/// GET /docs/{id} - Fetch a live document.
async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>> {
    Ok(Json(state.store.get(&id)?.into()))
}

/// PATCH /docs/{id} - Apply a JSON Patch.
async fn patch_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    IfMatch(expected): IfMatch,
    Json(ops): Json<Value>,
) -> Result<Json<WriteResponse>> {
    let patch = Patch::from_value(ops)?;
    let revision = state.store.patch(&id, patch, expected).await?;
    Ok(Json(WriteResponse { id, revision }))
}

/// DELETE /docs/{id} - Tombstone a document.
async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    IfMatch(expected): IfMatch,
) -> Result<StatusCode> {
    state.store.delete(&id, expected).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /docs - Ids of all live documents.
async fn list_documents(State(state): State<AppState>) -> Json<ListResponse> {
    Json(ListResponse {
        ids: state.store.list(),
    })
}

/// GET /docs/{id}/history - Retained change entries for a document.
async fn document_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChangeEntry>>> {
    Ok(Json(state.store.history(&id).await?))
}

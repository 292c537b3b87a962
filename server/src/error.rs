//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pakhuis_engine::{Error as EngineError, NodeId};
use serde::Serialize;

/// Errors from the document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt stored data: {0}")]
    Codec(String),

    #[error("mutation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors from one sync cycle against a peer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: NodeId, reason: String },

    #[error("peer {peer} protocol error: {reason}")]
    PeerProtocol { peer: NodeId, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether retrying later may succeed. Everything is retried, but local
    /// storage failures are logged louder.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::PeerUnreachable { .. } | SyncError::PeerProtocol { .. }
        )
    }
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Store(StoreError::Engine(e))
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn engine_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyExists(_) | EngineError::RevisionConflict { .. } => {
            StatusCode::CONFLICT
        }
        EngineError::InvalidQuery(_)
        | EngineError::InvalidPatch(_)
        | EngineError::InvalidPointer { .. } => StatusCode::BAD_REQUEST,
        EngineError::IndexCorruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Store(StoreError::Engine(e)) => {
                tracing::debug!("Engine error: {}", e);
                (engine_status(e), e.to_string(), None)
            }
            AppError::Store(e) => {
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage failure".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_status_codes() {
        let cases = [
            (EngineError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (EngineError::AlreadyExists("a".into()), StatusCode::CONFLICT),
            (
                EngineError::RevisionConflict {
                    expected: 1,
                    actual: 2,
                },
                StatusCode::CONFLICT,
            ),
            (EngineError::InvalidQuery("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::InvalidPatch("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn retryable_sync_errors() {
        let err = SyncError::PeerUnreachable {
            peer: "b".into(),
            reason: "timeout".into(),
        };
        assert!(err.is_retryable());
        let err = SyncError::Store(StoreError::Codec("bad".into()));
        assert!(!err.is_retryable());
    }
}

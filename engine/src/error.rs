//! Error types for the Pakhuis engine.

use crate::{DocumentId, Revision};
use thiserror::Error;

/// All possible errors from the Pakhuis engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("document not found: {0}")]
    NotFound(DocumentId),

    #[error("document already exists: {0}")]
    AlreadyExists(DocumentId),

    // Concurrency errors
    #[error("revision conflict: expected {expected}, current {actual}")]
    RevisionConflict { expected: Revision, actual: Revision },

    // Input errors
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("invalid JSON pointer '{pointer}': {reason}")]
    InvalidPointer { pointer: String, reason: String },

    // Derived state errors
    #[error("search index out of sync with documents: {0}")]
    IndexCorruption(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidPatch`] with a formatted message.
    pub(crate) fn patch(msg: impl Into<String>) -> Self {
        Error::InvalidPatch(msg.into())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

//! `If-Match` revision extraction.

use axum::{
    extract::FromRequestParts,
    http::{header::IF_MATCH, request::Parts},
};
use pakhuis_engine::Revision;

use crate::error::AppError;

/// The revision a write expects, taken from the `If-Match` header.
///
/// Accepts a bare number or a quoted entity tag such as `"3"`. A missing
/// header or `*` means "any revision".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfMatch(pub Option<Revision>);

impl<S: Send + Sync> FromRequestParts<S> for IfMatch {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IF_MATCH) else {
            return Ok(IfMatch(None));
        };
        let raw = value
            .to_str()
            .map_err(|_| AppError::BadRequest("If-Match is not valid text".to_string()))?;
        parse_if_match(raw).map(IfMatch)
    }
}

fn parse_if_match(raw: &str) -> Result<Option<Revision>, AppError> {
    let raw = raw.trim();
    if raw == "*" {
        return Ok(None);
    }
    let tag = raw.strip_prefix("W/").unwrap_or(raw).trim_matches('"');
    tag.parse()
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("If-Match must be a revision, got {}", raw)))
}

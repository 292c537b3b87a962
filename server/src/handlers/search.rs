//! Translation of search query strings into index queries.
//!
//! Parameter names are JSON Pointers (`/status=open`). An empty value asks
//! for documents where the field is absent. Values are read as JSON literals
//! when they parse (`42`, `true`, `null`, `"42"`) and as plain strings
//! otherwise. `include_bodies=true` is the only other accepted parameter.

use pakhuis_engine::{Error as EngineError, JsonPointer, Query};
use serde_json::Value;

/// A parsed search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    pub include_bodies: bool,
}

/// Parse raw query-string pairs into a [`SearchRequest`].
pub fn parse_search(params: &[(String, String)]) -> Result<SearchRequest, EngineError> {
    let mut query = Query::new();
    let mut include_bodies = false;

    for (key, value) in params {
        if key == "include_bodies" {
            include_bodies = matches!(value.as_str(), "true" | "1" | "yes");
            continue;
        }
        if !key.starts_with('/') {
            return Err(EngineError::InvalidQuery(format!(
                "unknown parameter '{}'; field names are JSON pointers",
                key
            )));
        }
        let path = JsonPointer::parse(key)
            .map_err(|e| EngineError::InvalidQuery(e.to_string()))?;

        query = if value.is_empty() {
            query.absent(path)
        } else {
            query.equals(path, literal(value))
        };
    }

    Ok(SearchRequest {
        query,
        include_bodies,
    })
}

fn literal(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

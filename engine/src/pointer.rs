//! JSON Pointer (RFC 6901) parsing and resolution.
//!
//! Pointers address indexed fields and patch targets. The empty pointer
//! addresses the whole document. Parsing and resolution are done by
//! `jsonptr`, the pointer type underneath `json-patch`.

use crate::{error::Result, Error};
use jsonptr::PointerBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A parsed JSON Pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JsonPointer(PointerBuf);

impl JsonPointer {
    /// Parse a pointer string such as `/tags/0` or `/a~1b`.
    pub fn parse(raw: &str) -> Result<Self> {
        PointerBuf::parse(raw)
            .map(Self)
            .map_err(|err| Error::InvalidPointer {
                pointer: raw.to_string(),
                reason: err.to_string(),
            })
    }

    /// Reference tokens, unescaped.
    pub fn tokens(&self) -> Vec<String> {
        self.0.tokens().map(|t| t.decoded().into_owned()).collect()
    }

    /// Whether this pointer addresses the whole document.
    pub fn is_root(&self) -> bool {
        self.0.is_root()
    }

    /// Whether `self` is a proper prefix of `other`.
    pub fn is_ancestor_of(&self, other: &JsonPointer) -> bool {
        let (mine, theirs) = (self.tokens(), other.tokens());
        mine.len() < theirs.len() && theirs.starts_with(&mine)
    }

    /// Resolve the pointer against a value.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.0.resolve(value).ok()
    }
}

impl From<PointerBuf> for JsonPointer {
    fn from(pointer: PointerBuf) -> Self {
        Self(pointer)
    }
}

impl PartialEq for JsonPointer {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

impl Eq for JsonPointer {}

impl Hash for JsonPointer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_str().hash(state);
    }
}

impl PartialOrd for JsonPointer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JsonPointer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_str().cmp(other.0.as_str())
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for JsonPointer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JsonPointer {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<JsonPointer> for String {
    fn from(pointer: JsonPointer) -> Self {
        pointer.to_string()
    }
}

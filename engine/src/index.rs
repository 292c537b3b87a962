//! Search index over configured field paths.
//!
//! The index is derived state: it maps `(path, value)` to the ids of live
//! documents holding that value and can always be rebuilt from the
//! documents themselves.

use crate::{error::Result, Document, DocumentId, Error, JsonPointer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// How values at an indexed path become index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// The whole value is one key
    #[default]
    Eq,
    /// Each element of an array value is a key
    InList,
}

/// A field path that is indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldRepr")]
pub struct IndexedField {
    pub path: JsonPointer,
    pub kind: IndexKind,
}

impl IndexedField {
    /// An equality index on `path`.
    pub fn eq(path: JsonPointer) -> Self {
        Self {
            path,
            kind: IndexKind::Eq,
        }
    }

    /// A per-element index on `path`.
    pub fn in_list(path: JsonPointer) -> Self {
        Self {
            path,
            kind: IndexKind::InList,
        }
    }

    /// Index keys for `body`. Never empty.
    fn keys(&self, body: &Value) -> Vec<IndexKey> {
        let value = self.path.resolve(body);
        match (self.kind, value) {
            (IndexKind::InList, Some(Value::Array(items))) => {
                let mut keys: Vec<IndexKey> = Vec::with_capacity(items.len());
                for item in items {
                    let key = IndexKey::of(Some(item));
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                if keys.is_empty() {
                    keys.push(IndexKey::Absent);
                }
                keys
            }
            _ => vec![IndexKey::of(value)],
        }
    }
}

/// Config accepts either a bare path or a table with a kind.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldRepr {
    Path(JsonPointer),
    Full {
        path: JsonPointer,
        #[serde(default)]
        kind: IndexKind,
    },
}

impl From<FieldRepr> for IndexedField {
    fn from(repr: FieldRepr) -> Self {
        match repr {
            FieldRepr::Path(path) => IndexedField::eq(path),
            FieldRepr::Full { path, kind } => IndexedField { path, kind },
        }
    }
}

/// A bucket key: the canonical JSON text of a value, or the absent sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    /// Missing path or empty string
    Absent,
    /// Canonical JSON text of the value
    Value(String),
}

impl IndexKey {
    /// Key under which a stored value is indexed.
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None => IndexKey::Absent,
            Some(Value::String(s)) if s.is_empty() => IndexKey::Absent,
            Some(v) => IndexKey::literal(v),
        }
    }

    /// Key a literal query value looks up. Unlike [`IndexKey::of`], an empty
    /// string stays a literal and so never matches the absent bucket.
    pub fn literal(value: &Value) -> Self {
        // serde_json objects are ordered maps, so this text is canonical.
        IndexKey::Value(value.to_string())
    }
}

/// One term of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Field equals this JSON value
    Equals(Value),
    /// Field is missing or an empty string
    Absent,
}

impl Constraint {
    fn key(&self) -> IndexKey {
        match self {
            Constraint::Equals(v) => IndexKey::literal(v),
            Constraint::Absent => IndexKey::Absent,
        }
    }
}

/// A conjunction of constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    constraints: Vec<(JsonPointer, Constraint)>,
}

impl Query {
    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality constraint.
    pub fn equals(mut self, path: JsonPointer, value: Value) -> Self {
        self.constraints.push((path, Constraint::Equals(value)));
        self
    }

    /// Add an absent constraint.
    pub fn absent(mut self, path: JsonPointer) -> Self {
        self.constraints.push((path, Constraint::Absent));
        self
    }

    /// The constraints in order.
    pub fn constraints(&self) -> &[(JsonPointer, Constraint)] {
        &self.constraints
    }

    /// Whether there are no constraints.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// The search index.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    fields: Vec<IndexedField>,
    /// path -> key -> ids in insertion order
    buckets: HashMap<JsonPointer, HashMap<IndexKey, Vec<DocumentId>>>,
    /// id -> keys it is filed under, for removal
    postings: HashMap<DocumentId, Vec<(JsonPointer, IndexKey)>>,
}

impl SearchIndex {
    /// Create an empty index over `fields`.
    pub fn new(fields: Vec<IndexedField>) -> Self {
        let buckets = fields
            .iter()
            .map(|f| (f.path.clone(), HashMap::new()))
            .collect();
        Self {
            fields,
            buckets,
            postings: HashMap::new(),
        }
    }

    /// Whether `path` is indexed.
    pub fn is_indexed(&self, path: &JsonPointer) -> bool {
        self.buckets.contains_key(path)
    }

    /// Number of documents in the index.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Keys a document would be filed under.
    fn postings_for(&self, doc: &Document) -> Vec<(JsonPointer, IndexKey)> {
        let mut out = Vec::new();
        for field in &self.fields {
            for key in field.keys(&doc.body) {
                out.push((field.path.clone(), key));
            }
        }
        out
    }

    /// Bring the index up to date with `doc`: drop its old keys, then file
    /// it under its new ones unless it is a tombstone.
    pub fn update(&mut self, doc: &Document) {
        self.remove(&doc.id);
        if !doc.is_active() {
            return;
        }
        let postings = self.postings_for(doc);
        for (path, key) in &postings {
            if let Some(bucket) = self.buckets.get_mut(path) {
                bucket.entry(key.clone()).or_default().push(doc.id.clone());
            }
        }
        self.postings.insert(doc.id.clone(), postings);
    }

    /// Remove a document from the index.
    pub fn remove(&mut self, id: &str) {
        let Some(postings) = self.postings.remove(id) else {
            return;
        };
        for (path, key) in postings {
            if let Some(bucket) = self.buckets.get_mut(&path) {
                if let Some(ids) = bucket.get_mut(&key) {
                    ids.retain(|x| x != id);
                    if ids.is_empty() {
                        bucket.remove(&key);
                    }
                }
            }
        }
    }

    /// Throw everything away and index `docs` from scratch. Bucket order
    /// follows the order of `docs`.
    pub fn rebuild<'a>(&mut self, docs: impl IntoIterator<Item = &'a Document>) {
        *self = SearchIndex::new(std::mem::take(&mut self.fields));
        for doc in docs {
            self.update(doc);
        }
    }

    fn check(&self, query: &Query) -> Result<()> {
        if query.is_empty() {
            return Err(Error::InvalidQuery(
                "at least one constraint is required".to_string(),
            ));
        }
        for (path, _) in query.constraints() {
            if !self.is_indexed(path) {
                return Err(Error::InvalidQuery(format!("{} is not an indexed field", path)));
            }
        }
        Ok(())
    }

    /// Ids matching every constraint of `query`, in the insertion order of
    /// the first constraint's bucket.
    pub fn search(&self, query: &Query) -> Result<Vec<DocumentId>> {
        self.check(query)?;

        let mut buckets = Vec::with_capacity(query.constraints().len());
        for (path, constraint) in query.constraints() {
            let ids = self
                .buckets
                .get(path)
                .and_then(|b| b.get(&constraint.key()))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            buckets.push(ids);
        }

        let Some((first, rest)) = buckets.split_first() else {
            return Ok(Vec::new());
        };
        let rest: Vec<HashSet<&DocumentId>> =
            rest.iter().map(|ids| ids.iter().collect()).collect();
        Ok(first
            .iter()
            .filter(|id| rest.iter().all(|set| set.contains(id)))
            .cloned()
            .collect())
    }

    /// Check that `doc` really satisfies `query`. A `false` means the index
    /// and the documents disagree.
    pub fn matches(&self, query: &Query, doc: &Document) -> bool {
        if !doc.is_active() {
            return false;
        }
        let postings = self.postings_for(doc);
        query.constraints().iter().all(|(path, constraint)| {
            let key = constraint.key();
            postings.iter().any(|(p, k)| p == path && *k == key)
        })
    }

    /// Search and confirm every hit against the documents.
    ///
    /// Returns [`Error::IndexCorruption`] if a hit does not hold up; the
    /// caller is expected to rebuild and retry.
    pub fn search_verified<'a, F>(&self, query: &Query, lookup: F) -> Result<Vec<DocumentId>>
    where
        F: Fn(&str) -> Option<&'a Document>,
    {
        let ids = self.search(query)?;
        for id in &ids {
            match lookup(id) {
                Some(doc) if self.matches(query, doc) => {}
                _ => {
                    return Err(Error::IndexCorruption(format!(
                        "stale hit {} for query",
                        id
                    )))
                }
            }
        }
        Ok(ids)
    }

    /// Distinct values currently indexed at `path`, sorted by their JSON text.
    pub fn values(&self, path: &JsonPointer) -> Result<Vec<Value>> {
        let bucket = self
            .buckets
            .get(path)
            .ok_or_else(|| Error::InvalidQuery(format!("{} is not an indexed field", path)))?;
        let sorted: BTreeMap<&String, ()> = bucket
            .keys()
            .filter_map(|k| match k {
                IndexKey::Value(text) => Some((text, ())),
                IndexKey::Absent => None,
            })
            .collect();
        Ok(sorted
            .into_keys()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect())
    }
}

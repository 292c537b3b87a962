//! Structural diffs: JSON Patch (RFC 6902) application and generation.
//!
//! Patches are the unit of change in the log. Local `PATCH` requests carry
//! one directly; full replacements are turned into one with [`diff`].
//! Strict application and diffing are done by `json-patch`.

use crate::{error::Result, Error, JsonPointer};
use json_patch::{PatchOperation, RemoveOperation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::slice;

/// An ordered list of RFC 6902 operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Vec<PatchOperation>);

impl Patch {
    /// Decode a patch from a raw JSON value (a request body, typically).
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::patch(e.to_string()))
    }

    /// Whether the patch has no operations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Apply the patch to `doc`, returning the new document.
    ///
    /// Either every operation succeeds or `doc` is left as it was.
    pub fn apply(&self, doc: &Value) -> Result<Value> {
        let mut out = doc.clone();
        json_patch::patch(&mut out, &self.0).map_err(|e| Error::patch(e.to_string()))?;
        Ok(out)
    }

    /// Apply the patch without failing on missing locations.
    ///
    /// Missing parents are created as objects. Removals of missing values
    /// and failed tests are skipped.
    pub fn apply_lenient(&self, doc: &Value) -> Value {
        let mut out = doc.clone();
        for op in &self.0 {
            if json_patch::patch(&mut out, slice::from_ref(op)).is_ok() {
                continue;
            }
            match op {
                PatchOperation::Add(add) => {
                    force_set(&mut out, &add.path.clone().into(), add.value.clone());
                }
                PatchOperation::Replace(replace) => {
                    force_set(&mut out, &replace.path.clone().into(), replace.value.clone());
                }
                PatchOperation::Copy(copy) => {
                    let from = JsonPointer::from(copy.from.clone());
                    if let Some(value) = from.resolve(&out).cloned() {
                        force_set(&mut out, &copy.path.clone().into(), value);
                    }
                }
                PatchOperation::Move(mv) => {
                    let from = JsonPointer::from(mv.from.clone());
                    let path = JsonPointer::from(mv.path.clone());
                    if from.is_ancestor_of(&path) {
                        continue;
                    }
                    let Some(value) = from.resolve(&out).cloned() else {
                        continue;
                    };
                    let take = PatchOperation::Remove(RemoveOperation {
                        path: mv.from.clone(),
                    });
                    if json_patch::patch(&mut out, slice::from_ref(&take)).is_ok() {
                        force_set(&mut out, &path, value);
                    }
                }
                PatchOperation::Remove(_) | PatchOperation::Test(_) => {}
            }
        }
        out
    }
}

/// Set `value` at `path`, creating or overwriting whatever is in the way.
fn force_set(doc: &mut Value, path: &JsonPointer, value: Value) {
    force_set_tokens(doc, &path.tokens(), value);
}

fn force_set_tokens(target: &mut Value, tokens: &[String], value: Value) {
    let Some((token, rest)) = tokens.split_first() else {
        *target = value;
        return;
    };

    if let Value::Array(items) = target {
        let idx = match array_index(token) {
            Some(idx) if idx < items.len() => idx,
            _ => {
                items.push(Value::Null);
                items.len() - 1
            }
        };
        return force_set_tokens(&mut items[idx], rest, value);
    }

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry(token.clone()).or_insert(Value::Null);
        force_set_tokens(slot, rest, value);
    }
}

/// Array index token without leading zeros.
fn array_index(token: &str) -> Option<usize> {
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Compute a patch that turns `old` into `new`.
pub fn diff(old: &Value, new: &Value) -> Patch {
    Patch(json_patch::diff(old, new).0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> Patch {
        Patch::from_value(value).unwrap()
    }

    #[test]
    fn replace_value() {
        let p = patch(json!([{"op": "replace", "path": "/x", "value": 2}]));
        assert_eq!(p.apply(&json!({"x": 1})).unwrap(), json!({"x": 2}));
    }

    #[test]
    fn add_to_object_and_array() {
        let p = patch(json!([
            {"op": "add", "path": "/tags", "value": ["a"]},
            {"op": "add", "path": "/tags/-", "value": "c"},
            {"op": "add", "path": "/tags/1", "value": "b"}
        ]));
        assert_eq!(
            p.apply(&json!({})).unwrap(),
            json!({"tags": ["a", "b", "c"]})
        );
    }

    #[test]
    fn move_copy_and_test() {
        let p = patch(json!([
            {"op": "test", "path": "/a", "value": 1},
            {"op": "copy", "from": "/a", "path": "/b"},
            {"op": "move", "from": "/a", "path": "/c"}
        ]));
        assert_eq!(p.apply(&json!({"a": 1})).unwrap(), json!({"b": 1, "c": 1}));
    }

    #[test]
    fn failure_leaves_document_untouched() {
        let doc = json!({"a": 1});
        let p = patch(json!([
            {"op": "add", "path": "/b", "value": 2},
            {"op": "remove", "path": "/missing"}
        ]));
        let err = p.apply(&doc).unwrap_err();
        assert!(matches!(err, Error::InvalidPatch(_)));
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn type_mismatch_is_invalid_patch() {
        let p = patch(json!([{"op": "replace", "path": "/x/y", "value": 1}]));
        assert!(matches!(
            p.apply(&json!({"x": 5})),
            Err(Error::InvalidPatch(_))
        ));

        let p = patch(json!([{"op": "add", "path": "/x/y", "value": 1}]));
        assert!(matches!(
            p.apply(&json!({"x": "str"})),
            Err(Error::InvalidPatch(_))
        ));
    }

    #[test]
    fn move_into_own_child_rejected() {
        let p = patch(json!([{"op": "move", "from": "/a", "path": "/a/b"}]));
        assert!(p.apply(&json!({"a": {}})).is_err());
    }

    #[test]
    fn malformed_operation_rejected() {
        assert!(Patch::from_value(json!([{"op": "frobnicate", "path": "/a"}])).is_err());
        assert!(Patch::from_value(json!([{"op": "add", "path": "a", "value": 1}])).is_err());
        assert!(Patch::from_value(json!({"op": "add"})).is_err());
    }

    #[test]
    fn lenient_creates_parents_and_skips_missing() {
        let p = patch(json!([
            {"op": "replace", "path": "/a/b", "value": 1},
            {"op": "remove", "path": "/gone"},
            {"op": "test", "path": "/x", "value": 9}
        ]));
        assert_eq!(p.apply_lenient(&json!({"x": 0})), json!({"x": 0, "a": {"b": 1}}));
    }

    #[test]
    fn lenient_overwrites_scalar_parent() {
        let p = patch(json!([{"op": "add", "path": "/a/b", "value": true}]));
        assert_eq!(p.apply_lenient(&json!({"a": 3})), json!({"a": {"b": true}}));
    }

    #[test]
    fn diff_objects() {
        let old = json!({"a": 1, "b": {"c": 2}, "gone": true});
        let new = json!({"a": 1, "b": {"c": 3}, "added": [1]});
        let p = diff(&old, &new);
        assert_eq!(p.apply(&old).unwrap(), new);
        assert!(!p.is_empty());
    }

    #[test]
    fn diff_arrays_grow_and_shrink() {
        let old = json!([1, 2, 3, 4]);
        let new = json!([1, 9]);
        assert_eq!(diff(&old, &new).apply(&old).unwrap(), new);
        assert_eq!(diff(&new, &old).apply(&new).unwrap(), old);
    }

    #[test]
    fn diff_of_equal_values_is_empty() {
        let v = json!({"a": [1, {"b": null}]});
        assert!(diff(&v, &v).is_empty());
    }

    #[test]
    fn diff_root_type_change() {
        let p = diff(&json!({"a": 1}), &json!([1]));
        assert_eq!(p.apply(&json!({"a": 1})).unwrap(), json!([1]));
    }

    #[test]
    fn lenient_move_into_missing_parent() {
        let p = patch(json!([{"op": "move", "from": "/a", "path": "/b/c"}]));
        assert_eq!(p.apply_lenient(&json!({"a": 1})), json!({"b": {"c": 1}}));
        assert_eq!(p.apply_lenient(&json!({"z": 1})), json!({"z": 1}));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_json() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                (-50i64..50).prop_map(Value::from),
                "[a-c~/]{0,3}".prop_map(Value::String),
            ];
            leaf.prop_recursive(4, 48, 5, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                    prop::collection::btree_map("[a-d~/]{0,2}", inner, 0..5)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            #[test]
            fn prop_diff_then_apply_reaches_target(a in arb_json(), b in arb_json()) {
                let p = diff(&a, &b);
                prop_assert_eq!(p.apply(&a).unwrap(), b.clone());
                prop_assert_eq!(p.apply_lenient(&a), b);
            }

            #[test]
            fn prop_diff_of_self_is_empty(a in arb_json()) {
                prop_assert!(diff(&a, &a).is_empty());
            }
        }
    }
}

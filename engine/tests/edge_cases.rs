//! Edge case tests for pakhuis-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use pakhuis_engine::{
    mutation, patch, Change, Document, Error, IndexedField, JsonPointer, Outcome, Patch, Query,
    Reconciler, SearchIndex,
};
use serde_json::{json, Value};

fn ptr(s: &str) -> JsonPointer {
    JsonPointer::parse(s).unwrap()
}

fn patch(ops: Value) -> Patch {
    Patch::from_value(ops).unwrap()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn unicode_ids_and_values() {
    let names = [
        "日本語テスト",
        "Привет мир",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
    ];
    let mut index = SearchIndex::new(vec![IndexedField::eq(ptr("/name"))]);

    for (i, name) in names.iter().enumerate() {
        let doc = mutation::plan_create(None, format!("doc-{}-{}", i, name), json!({"name": name}), 1)
            .unwrap()
            .document;
        index.update(&doc);
    }

    for (i, name) in names.iter().enumerate() {
        let hits = index.search(&Query::new().equals(ptr("/name"), json!(name))).unwrap();
        assert_eq!(hits, vec![format!("doc-{}-{}", i, name)]);
    }
}

#[test]
fn empty_string_is_absent_when_stored_but_literal_when_queried() {
    let mut index = SearchIndex::new(vec![IndexedField::eq(ptr("/owner"))]);
    index.update(&Document::new("a", json!({"owner": ""}), 1));
    index.update(&Document::new("b", json!({}), 1));
    index.update(&Document::new("c", json!({"owner": null}), 1));

    let absent = index.search(&Query::new().absent(ptr("/owner"))).unwrap();
    assert_eq!(absent, vec!["a".to_string(), "b".to_string()]);

    let empty = index.search(&Query::new().equals(ptr("/owner"), json!(""))).unwrap();
    assert!(empty.is_empty());

    let null = index.search(&Query::new().equals(ptr("/owner"), json!(null))).unwrap();
    assert_eq!(null, vec!["c".to_string()]);
}

#[test]
fn pointer_with_escaped_characters() {
    let path = ptr("/a~1b/c~0d");
    let mut index = SearchIndex::new(vec![IndexedField::eq(path.clone())]);
    index.update(&Document::new("x", json!({"a/b": {"c~d": 7}}), 1));

    let hits = index.search(&Query::new().equals(path, json!(7))).unwrap();
    assert_eq!(hits, vec!["x".to_string()]);
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn integer_and_float_keys_differ() {
    let mut index = SearchIndex::new(vec![IndexedField::eq(ptr("/n"))]);
    index.update(&Document::new("int", json!({"n": 1}), 1));
    index.update(&Document::new("float", json!({"n": 1.0}), 1));

    let ints = index.search(&Query::new().equals(ptr("/n"), json!(1))).unwrap();
    assert_eq!(ints, vec!["int".to_string()]);
}

#[test]
fn integer_boundaries_survive_patches() {
    let doc = Document::new("a", json!({"n": 0}), 1);
    for value in [i64::MIN, i64::MAX, 0] {
        let p = patch(json!([{"op": "replace", "path": "/n", "value": value}]));
        assert_eq!(p.apply(&doc.body).unwrap(), json!({"n": value}));
    }
    let p = patch(json!([{"op": "replace", "path": "/n", "value": u64::MAX}]));
    assert_eq!(p.apply(&doc.body).unwrap(), json!({"n": u64::MAX}));
}

// ============================================================================
// Structure Edge Cases
// ============================================================================

#[test]
fn deeply_nested_diff_round_trips() {
    let mut old = json!("leaf");
    let mut new = json!("changed");
    for depth in 0..50 {
        let key = format!("level{}", depth);
        old = json!({ key.clone(): old });
        new = json!({ key: new });
    }

    let diff = patch::diff(&old, &new);
    assert_eq!(diff.len(), 1);
    assert_eq!(diff.apply(&old).unwrap(), new);
}

#[test]
fn diff_of_equal_documents_is_empty() {
    let doc = json!({"a": [1, 2, {"b": null}], "c": true});
    assert!(patch::diff(&doc, &doc).is_empty());
}

#[test]
fn diff_handles_type_changes_and_array_shrink() {
    let old = json!({"a": [1, 2, 3, 4], "b": {"x": 1}, "c": 1});
    let new = json!({"a": [1, 9], "b": [1], "d": "new"});
    assert_eq!(patch::diff(&old, &new).apply(&old).unwrap(), new);
}

#[test]
fn root_replace_swaps_whole_body() {
    let p = patch(json!([{"op": "replace", "path": "", "value": [1, 2]}]));
    assert_eq!(p.apply(&json!({"a": 1})).unwrap(), json!([1, 2]));
}

#[test]
fn failed_patch_leaves_document_untouched() {
    let doc = mutation::plan_create(None, "a", json!({"x": 1}), 1).unwrap().document;
    let p = patch(json!([
        {"op": "replace", "path": "/x", "value": 2},
        {"op": "test", "path": "/x", "value": 1}
    ]));

    let err = mutation::plan_patch(Some(&doc), "a", p, None, 2).unwrap_err();
    assert!(matches!(err, Error::InvalidPatch(_)));
    assert_eq!(doc.body, json!({"x": 1}));
    assert_eq!(doc.revision, 1);
}

#[test]
fn malformed_patch_is_rejected() {
    assert!(matches!(
        Patch::from_value(json!([{"op": "explode", "path": "/x"}])),
        Err(Error::InvalidPatch(_))
    ));
    assert!(Patch::from_value(json!({"op": "add"})).is_err());
}

// ============================================================================
// Lifecycle Edge Cases
// ============================================================================

#[test]
fn rapid_updates_same_document() {
    let mut doc = mutation::plan_create(None, "a", json!({"n": 0}), 1).unwrap().document;
    for i in 1..=100 {
        let p = patch(json!([{"op": "replace", "path": "/n", "value": i}]));
        doc = mutation::plan_patch(Some(&doc), "a", p, Some(doc.revision), 1 + i)
            .unwrap()
            .document;
    }
    assert_eq!(doc.revision, 101);
    assert_eq!(doc.body, json!({"n": 100}));
}

#[test]
fn deleted_document_rejects_patch_and_delete() {
    let doc = mutation::plan_create(None, "a", json!({}), 1).unwrap().document;
    let tomb = mutation::plan_delete(Some(&doc), "a", None, 2).unwrap().document;

    let p = patch(json!([{"op": "add", "path": "/x", "value": 1}]));
    assert!(matches!(
        mutation::plan_patch(Some(&tomb), "a", p, None, 3),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        mutation::plan_delete(Some(&tomb), "a", None, 3),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn put_over_tombstone_continues_revisions() {
    let doc = mutation::plan_create(None, "a", json!({"v": 1}), 1).unwrap().document;
    let tomb = mutation::plan_delete(Some(&doc), "a", None, 2).unwrap().document;
    let m = mutation::plan_put(Some(&tomb), "a", json!({"v": 2}), Some(2), 3).unwrap();

    assert_eq!(m.revision(), 3);
    assert!(matches!(m.change.change, Change::Create { .. }));
}

#[test]
fn tombstones_leave_the_index() {
    let mut index = SearchIndex::new(vec![IndexedField::in_list(ptr("/tags"))]);
    let doc = mutation::plan_create(None, "a", json!({"tags": ["x", "y"]}), 1)
        .unwrap()
        .document;
    index.update(&doc);
    assert_eq!(index.len(), 1);

    let tomb = mutation::plan_delete(Some(&doc), "a", None, 2).unwrap().document;
    index.update(&tomb);
    assert!(index.is_empty());
    assert!(index
        .search(&Query::new().equals(ptr("/tags"), json!("x")))
        .unwrap()
        .is_empty());
}

// ============================================================================
// Reconciliation Edge Cases
// ============================================================================

#[test]
fn remote_patch_for_missing_document_lands_as_create() {
    let r = Reconciler::new("a", "b");
    let entry = pakhuis_engine::NewChange {
        document_id: "ghost".into(),
        change: Change::Patch {
            patch: patch(json!([{"op": "add", "path": "/x", "value": 1}])),
        },
        revision_before: 3,
        revision_after: 4,
        origin: pakhuis_engine::Origin::Local,
        timestamp: 10,
        body_after: None,
    }
    .into_entry(7);

    let (mutation, record) = r.reconcile(None, &entry, 11).into_parts();
    assert!(record.is_some());
    let m = mutation.unwrap();
    assert_eq!(m.document.body, json!({"x": 1}));
    assert_eq!(m.document.revision, 5);
    assert!(matches!(m.change.change, Change::Create { .. }));
}

#[test]
fn same_timestamp_different_nodes_is_deterministic() {
    let base = Document::new("a", json!({"v": 0}), 1);
    let local = mutation::plan_put(Some(&base), "a", json!({"v": "mine"}), None, 50)
        .unwrap()
        .document;
    let entry = mutation::plan_put(Some(&base), "a", json!({"v": "theirs"}), None, 50)
        .unwrap()
        .change
        .into_entry(2);

    for _ in 0..10 {
        let outcome = Reconciler::new("node1", "node2").reconcile(Some(&local), &entry, 0);
        let Outcome::Conflict { mutation, .. } = outcome else {
            panic!("expected conflict");
        };
        assert_eq!(mutation.unwrap().document.body, json!({"v": "theirs"}));
    }
}

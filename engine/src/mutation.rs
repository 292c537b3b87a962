//! Mutation planning.
//!
//! A mutation is computed against the current state of one document without
//! touching it. The caller persists the resulting change and document, then
//! commits the document into memory. Local writes and replicated writes both
//! end up as a [`Mutation`].

use crate::{
    document::{revision_of, SyncPoint},
    error::Result,
    patch, Change, ChangeEntry, Document, DocumentId, Error, NewChange, Origin, Patch, Revision,
    Timestamp,
};
use serde_json::Value;

/// A planned change to one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// The document as it will be after the change
    pub document: Document,
    /// The log entry describing the change
    pub change: NewChange,
}

impl Mutation {
    /// The revision the document will have.
    pub fn revision(&self) -> Revision {
        self.document.revision
    }
}

fn check_expected(current: Option<&Document>, expected: Option<Revision>) -> Result<()> {
    match expected {
        Some(expected) if expected != revision_of(current) => Err(Error::RevisionConflict {
            expected,
            actual: revision_of(current),
        }),
        _ => Ok(()),
    }
}

fn live<'a>(current: Option<&'a Document>, id: &str) -> Result<&'a Document> {
    current
        .filter(|d| d.is_active())
        .ok_or_else(|| Error::NotFound(id.to_string()))
}

/// Plan the creation of `id`.
///
/// Fails if a live document exists. A tombstone is resurrected with the
/// next revision.
pub fn plan_create(
    current: Option<&Document>,
    id: impl Into<DocumentId>,
    body: Value,
    timestamp: Timestamp,
) -> Result<Mutation> {
    let id = id.into();
    if current.is_some_and(|d| d.is_active()) {
        return Err(Error::AlreadyExists(id));
    }
    Ok(create_over(current, id, body, timestamp, Origin::Local))
}

fn create_over(
    current: Option<&Document>,
    id: DocumentId,
    body: Value,
    timestamp: Timestamp,
    origin: Origin,
) -> Mutation {
    let document = match current {
        Some(tombstone) => {
            let mut doc = tombstone.clone();
            doc.update_body(body.clone(), timestamp);
            doc
        }
        None => Document::new(id.clone(), body.clone(), timestamp),
    };
    Mutation {
        change: NewChange {
            document_id: id,
            change: Change::Create { body },
            revision_before: revision_of(current),
            revision_after: document.revision,
            origin,
            timestamp,
            body_after: None,
        },
        document,
    }
}

/// Plan a full write of `id`: create when absent, otherwise replace.
///
/// A replacement is logged as the diff between the old and new body.
pub fn plan_put(
    current: Option<&Document>,
    id: impl Into<DocumentId>,
    body: Value,
    expected: Option<Revision>,
    timestamp: Timestamp,
) -> Result<Mutation> {
    let id = id.into();
    check_expected(current, expected)?;
    match current.filter(|d| d.is_active()) {
        Some(existing) => {
            let patch = patch::diff(&existing.body, &body);
            Ok(edit(existing, patch, body, timestamp, Origin::Local))
        }
        None => Ok(create_over(current, id, body, timestamp, Origin::Local)),
    }
}

/// Plan applying `patch` to `id`.
pub fn plan_patch(
    current: Option<&Document>,
    id: &str,
    patch: Patch,
    expected: Option<Revision>,
    timestamp: Timestamp,
) -> Result<Mutation> {
    let existing = live(current, id)?;
    check_expected(current, expected)?;
    let body = patch.apply(&existing.body)?;
    Ok(edit(existing, patch, body, timestamp, Origin::Local))
}

fn edit(
    existing: &Document,
    patch: Patch,
    body: Value,
    timestamp: Timestamp,
    origin: Origin,
) -> Mutation {
    let mut document = existing.clone();
    document.update_body(body, timestamp);
    Mutation {
        change: NewChange {
            document_id: existing.id.clone(),
            change: Change::Patch { patch },
            revision_before: existing.revision,
            revision_after: document.revision,
            origin,
            timestamp,
            body_after: Some(document.body.clone()),
        },
        document,
    }
}

/// Plan tombstoning `id`.
pub fn plan_delete(
    current: Option<&Document>,
    id: &str,
    expected: Option<Revision>,
    timestamp: Timestamp,
) -> Result<Mutation> {
    let existing = live(current, id)?;
    check_expected(current, expected)?;
    let mut document = existing.clone();
    document.mark_deleted(timestamp);
    Ok(Mutation {
        change: NewChange {
            document_id: existing.id.clone(),
            change: Change::Delete,
            revision_before: existing.revision,
            revision_after: document.revision,
            origin: Origin::Local,
            timestamp,
            body_after: None,
        },
        document,
    })
}

/// Land a remote entry on top of `current` as a replicated write.
///
/// The document takes the body the entry left on the writing node. Entries
/// without one are replayed, leniently if they no longer apply. `revision`
/// is the local revision the document ends up with and `sync` the agreed
/// point the write establishes. The remote timestamp is kept so later
/// conflicts compare original write times.
pub(crate) fn plan_replicated(
    current: Option<&Document>,
    entry: &ChangeEntry,
    revision: Revision,
    sync: SyncPoint,
) -> Mutation {
    let id = &entry.document_id;
    let origin = Origin::replicated(sync.peer.clone());
    let base = current.cloned().unwrap_or_else(|| Document {
        deleted: true,
        ..Document::new(id.clone(), Value::Null, entry.timestamp)
    });

    let (body, deleted, logged) = match &entry.change {
        Change::Create { body } => (body.clone(), false, entry.change.clone()),
        Change::Patch { patch } => {
            let replayed = patch.apply(&base.body);
            let body = match (&entry.body_after, &replayed) {
                (Some(body), _) => body.clone(),
                (None, Ok(body)) => body.clone(),
                (None, Err(_)) => patch.apply_lenient(&base.body),
            };
            let logged = if !base.is_active() {
                // Landing on a tombstone or nothing at all: log the full body.
                Change::Create { body: body.clone() }
            } else if replayed.as_ref().is_ok_and(|b| *b == body) {
                entry.change.clone()
            } else {
                Change::Patch {
                    patch: patch::diff(&base.body, &body),
                }
            };
            (body, false, logged)
        }
        Change::Delete => (base.body.clone(), true, Change::Delete),
    };

    let body_after = matches!(logged, Change::Patch { .. }).then(|| body.clone());
    let document = Document {
        id: id.clone(),
        body,
        revision,
        updated_at: entry.timestamp,
        deleted,
        origin: origin.clone(),
        sync: Some(sync),
    };
    Mutation {
        change: NewChange {
            document_id: id.clone(),
            change: logged,
            revision_before: revision_of(current),
            revision_after: revision,
            origin,
            timestamp: entry.timestamp,
            body_after,
        },
        document,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn replace_x(value: i64) -> Patch {
        Patch::from_value(json!([{"op": "replace", "path": "/x", "value": value}])).unwrap()
    }

    #[test]
    fn create_then_patch_then_conflict() {
        let m = plan_create(None, "a", json!({"x": 1}), 100).unwrap();
        assert_eq!(m.revision(), 1);
        assert_eq!(m.change.revision_before, 0);
        let doc = m.document;

        let m = plan_patch(Some(&doc), "a", replace_x(2), Some(1), 200).unwrap();
        assert_eq!(m.revision(), 2);
        assert_eq!(m.document.body, json!({"x": 2}));
        assert!(matches!(m.change.change, Change::Patch { .. }));
        let doc = m.document;

        let err = plan_patch(Some(&doc), "a", replace_x(3), Some(1), 300).unwrap_err();
        assert_eq!(
            err,
            Error::RevisionConflict {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn create_over_live_document_fails() {
        let doc = Document::new("a", json!({}), 1);
        assert_eq!(
            plan_create(Some(&doc), "a", json!({}), 2).unwrap_err(),
            Error::AlreadyExists("a".into())
        );
    }

    #[test]
    fn create_over_tombstone_continues_revisions() {
        let mut doc = Document::new("a", json!({"v": 1}), 1);
        doc.mark_deleted(2);
        let m = plan_create(Some(&doc), "a", json!({"v": 2}), 3).unwrap();
        assert_eq!(m.change.revision_before, 2);
        assert_eq!(m.revision(), 3);
        assert!(m.document.is_active());
    }

    #[test]
    fn put_replaces_with_diff() {
        let doc = Document::new("a", json!({"x": 1, "y": 1}), 1);
        let m = plan_put(Some(&doc), "a", json!({"x": 1, "y": 2}), None, 2).unwrap();
        match &m.change.change {
            Change::Patch { patch } => assert_eq!(patch.len(), 1),
            other => panic!("expected patch, got {:?}", other),
        }
        assert_eq!(m.revision(), 2);

        let m = plan_put(None, "b", json!({"x": 1}), None, 2).unwrap();
        assert!(matches!(m.change.change, Change::Create { .. }));
    }

    #[test]
    fn put_checks_expected_revision() {
        let doc = Document::new("a", json!({}), 1);
        assert!(matches!(
            plan_put(Some(&doc), "a", json!({}), Some(4), 2),
            Err(Error::RevisionConflict { .. })
        ));
        assert!(matches!(
            plan_put(None, "a", json!({}), Some(1), 2),
            Err(Error::RevisionConflict {
                expected: 1,
                actual: 0
            })
        ));
    }

    #[test]
    fn delete_and_patch_on_tombstone() {
        let doc = Document::new("a", json!({"x": 1}), 1);
        let m = plan_delete(Some(&doc), "a", Some(1), 2).unwrap();
        assert!(m.document.deleted);
        assert_eq!(m.revision(), 2);
        let tomb = m.document;

        assert_eq!(
            plan_delete(Some(&tomb), "a", None, 3).unwrap_err(),
            Error::NotFound("a".into())
        );
        assert_eq!(
            plan_patch(Some(&tomb), "a", replace_x(1), None, 3).unwrap_err(),
            Error::NotFound("a".into())
        );
        assert_eq!(
            plan_patch(None, "zz", replace_x(1), None, 3).unwrap_err(),
            Error::NotFound("zz".into())
        );
    }

    #[test]
    fn invalid_patch_is_rejected() {
        let doc = Document::new("a", json!({"x": 1}), 1);
        let bad = Patch::from_value(json!([{"op": "remove", "path": "/nope"}])).unwrap();
        assert!(matches!(
            plan_patch(Some(&doc), "a", bad, None, 2),
            Err(Error::InvalidPatch(_))
        ));
    }

    fn remote_patch(value: i64, body_after: Option<Value>) -> ChangeEntry {
        NewChange {
            document_id: "a".into(),
            change: Change::Patch {
                patch: replace_x(value),
            },
            revision_before: 1,
            revision_after: 2,
            origin: Origin::Local,
            timestamp: 50,
            body_after,
        }
        .into_entry(3)
    }

    fn point(peer_revision: Revision, local_revision: Revision) -> SyncPoint {
        SyncPoint {
            peer: "b".into(),
            peer_revision,
            local_revision,
        }
    }

    #[test]
    fn replicated_patch_over_tombstone_logs_create() {
        let mut doc = Document::new("a", json!({"x": 1}), 1);
        doc.mark_deleted(2);
        let m = plan_replicated(Some(&doc), &remote_patch(5, None), 4, point(2, 4));
        assert!(m.document.is_active());
        assert_eq!(m.document.body, json!({"x": 5}));
        assert_eq!(m.document.updated_at, 50);
        assert_eq!(m.document.origin, Origin::replicated("b"));
        assert_eq!(m.document.sync, Some(point(2, 4)));
        assert!(matches!(m.change.change, Change::Create { .. }));
        assert_eq!(m.change.body_after, None);
        assert_eq!(m.change.revision_before, 2);
        assert_eq!(m.change.revision_after, 4);
    }

    #[test]
    fn replicated_patch_takes_the_writers_body() {
        let doc = Document::new("a", json!({"x": 1, "y": 1}), 1);
        let writer_body = json!({"x": 5, "y": 0});
        let m = plan_replicated(
            Some(&doc),
            &remote_patch(5, Some(writer_body.clone())),
            2,
            point(2, 2),
        );
        assert_eq!(m.document.body, writer_body);
        assert_eq!(m.change.body_after, Some(writer_body.clone()));
        // The logged patch still turns the old body into the new one.
        let Change::Patch { patch } = &m.change.change else {
            panic!("expected patch, got {:?}", m.change.change);
        };
        assert_eq!(patch.apply(&doc.body).unwrap(), writer_body);
    }

    #[test]
    fn replicated_patch_without_body_is_replayed() {
        let doc = Document::new("a", json!({"y": 1}), 1);
        let m = plan_replicated(Some(&doc), &remote_patch(5, None), 2, point(2, 2));
        assert_eq!(m.document.body, json!({"y": 1, "x": 5}));
        assert_eq!(m.change.body_after, Some(json!({"y": 1, "x": 5})));
    }

    #[test]
    fn local_edits_record_body_after() {
        let doc = Document::new("a", json!({"x": 1}), 1);
        let m = plan_patch(Some(&doc), "a", replace_x(2), None, 2).unwrap();
        assert_eq!(m.change.body_after, Some(json!({"x": 2})));

        let m = plan_delete(Some(&m.document), "a", None, 3).unwrap();
        assert_eq!(m.change.body_after, None);
    }
}

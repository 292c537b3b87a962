//! Database operations for the documents table.

use super::{to_i64, to_u64, Pool};
use pakhuis_engine::{Document, DocumentId, Origin, Sequence, SyncPoint, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqliteConnection};

/// A stored document row.
#[derive(Debug)]
pub struct StoredDocument {
    pub id: String,
    pub body: serde_json::Value,
    pub revision: i64,
    pub updated_at: i64,
    pub deleted: bool,
    pub origin_peer: Option<String>,
    pub last_sequence: i64,
    pub sync_peer: Option<String>,
    pub sync_peer_revision: Option<i64>,
    pub sync_local_revision: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredDocument {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let Json(body) = row.try_get::<Json<serde_json::Value>, _>("body")?;
        Ok(StoredDocument {
            id: row.try_get("id")?,
            body,
            revision: row.try_get("revision")?,
            updated_at: row.try_get("updated_at")?,
            deleted: row.try_get("deleted")?,
            origin_peer: row.try_get("origin_peer")?,
            last_sequence: row.try_get("last_sequence")?,
            sync_peer: row.try_get("sync_peer")?,
            sync_peer_revision: row.try_get("sync_peer_revision")?,
            sync_local_revision: row.try_get("sync_local_revision")?,
        })
    }
}

impl StoredDocument {
    /// Convert database row to an engine Document and the sequence of the
    /// change that last touched it.
    pub fn into_document(self) -> (Document, Sequence) {
        let sync = match (self.sync_peer, self.sync_peer_revision, self.sync_local_revision) {
            (Some(peer), Some(peer_revision), Some(local_revision)) => Some(SyncPoint {
                peer,
                peer_revision: to_u64(peer_revision),
                local_revision: to_u64(local_revision),
            }),
            _ => None,
        };
        let doc = Document {
            id: self.id,
            body: self.body,
            revision: to_u64(self.revision),
            updated_at: to_u64(self.updated_at),
            deleted: self.deleted,
            origin: match self.origin_peer {
                Some(peer) => Origin::Replicated { peer },
                None => Origin::Local,
            },
            sync,
        };
        (doc, to_u64(self.last_sequence))
    }
}

/// Upsert a document along with the sequence of the change that produced it.
pub async fn upsert_document(
    conn: &mut SqliteConnection,
    doc: &Document,
    sequence: Sequence,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO documents (
            id, body, revision, updated_at, deleted, origin_peer, last_sequence,
            sync_peer, sync_peer_revision, sync_local_revision
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT (id) DO UPDATE SET
            body = excluded.body,
            revision = excluded.revision,
            updated_at = excluded.updated_at,
            deleted = excluded.deleted,
            origin_peer = excluded.origin_peer,
            last_sequence = excluded.last_sequence,
            sync_peer = excluded.sync_peer,
            sync_peer_revision = excluded.sync_peer_revision,
            sync_local_revision = excluded.sync_local_revision
        "#,
    )
    .bind(&doc.id)
    .bind(Json(&doc.body))
    .bind(to_i64(doc.revision))
    .bind(to_i64(doc.updated_at))
    .bind(doc.deleted)
    .bind(doc.origin.peer())
    .bind(to_i64(sequence))
    .bind(doc.sync.as_ref().map(|s| s.peer.as_str()))
    .bind(doc.sync.as_ref().map(|s| to_i64(s.peer_revision)))
    .bind(doc.sync.as_ref().map(|s| to_i64(s.local_revision)))
    .execute(conn)
    .await?;

    Ok(())
}

/// Record where `doc` now agrees with a peer, leaving everything else in
/// the row as it is.
pub async fn update_sync_point(
    conn: &mut SqliteConnection,
    doc: &Document,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE documents
        SET sync_peer = ?2, sync_peer_revision = ?3, sync_local_revision = ?4
        WHERE id = ?1
        "#,
    )
    .bind(&doc.id)
    .bind(doc.sync.as_ref().map(|s| s.peer.as_str()))
    .bind(doc.sync.as_ref().map(|s| to_i64(s.peer_revision)))
    .bind(doc.sync.as_ref().map(|s| to_i64(s.local_revision)))
    .execute(conn)
    .await?;

    Ok(())
}

/// Load every document, tombstones included, with the sequence of the
/// change that last touched it. Oldest change first.
pub async fn load_documents(pool: &Pool) -> Result<Vec<(Document, Sequence)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT id, body, revision, updated_at, deleted, origin_peer, last_sequence,
               sync_peer, sync_peer_revision, sync_local_revision
        FROM documents
        ORDER BY last_sequence
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StoredDocument::into_document).collect())
}

/// Delete tombstones whose final change every peer has pulled and which
/// are older than `older_than`. Returns the purged ids.
pub async fn purge_tombstones(
    conn: &mut SqliteConnection,
    acked_through: Sequence,
    older_than: Timestamp,
) -> Result<Vec<DocumentId>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        DELETE FROM documents
        WHERE deleted = 1 AND last_sequence <= ?1 AND updated_at < ?2
        RETURNING id
        "#,
    )
    .bind(to_i64(acked_through))
    .bind(to_i64(older_than))
    .fetch_all(conn)
    .await?;

    rows.iter().map(|row| row.try_get("id")).collect()
}

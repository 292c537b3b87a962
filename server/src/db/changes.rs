//! Database operations for the change log.

use super::{to_i64, to_u64, Pool};
use crate::error::StoreError;
use futures::{Stream, StreamExt};
use pakhuis_engine::{Change, ChangeEntry, ChangeKind, NewChange, Origin, Sequence, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqliteConnection};

/// A stored change-log row.
#[derive(Debug)]
pub struct StoredChange {
    pub sequence: i64,
    pub document_id: String,
    pub op: String,
    pub diff: Option<serde_json::Value>,
    pub revision_before: i64,
    pub revision_after: i64,
    pub origin_peer: Option<String>,
    pub timestamp: i64,
    pub body_after: Option<serde_json::Value>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredChange {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let diff: Option<Json<serde_json::Value>> = row.try_get("diff")?;
        let body_after: Option<Json<serde_json::Value>> = row.try_get("body_after")?;
        Ok(StoredChange {
            sequence: row.try_get("sequence")?,
            document_id: row.try_get("document_id")?,
            op: row.try_get("op")?,
            diff: diff.map(|Json(v)| v),
            revision_before: row.try_get("revision_before")?,
            revision_after: row.try_get("revision_after")?,
            origin_peer: row.try_get("origin_peer")?,
            timestamp: row.try_get("timestamp")?,
            body_after: body_after.map(|Json(v)| v),
        })
    }
}

impl StoredChange {
    /// Convert database row to an engine ChangeEntry.
    pub fn into_entry(self) -> Result<ChangeEntry, StoreError> {
        let kind = ChangeKind::parse(&self.op).ok_or_else(|| {
            StoreError::Codec(format!("unknown op '{}' at sequence {}", self.op, self.sequence))
        })?;
        let change = Change::from_parts(kind, self.diff)
            .map_err(|e| StoreError::Codec(format!("sequence {}: {}", self.sequence, e)))?;

        Ok(ChangeEntry {
            sequence: to_u64(self.sequence),
            document_id: self.document_id,
            change,
            revision_before: to_u64(self.revision_before),
            revision_after: to_u64(self.revision_after),
            origin: match self.origin_peer {
                Some(peer) => Origin::Replicated { peer },
                None => Origin::Local,
            },
            timestamp: to_u64(self.timestamp),
            body_after: self.body_after,
        })
    }
}

const SELECT_CHANGES: &str = r#"
    SELECT sequence, document_id, op, diff, revision_before, revision_after, origin_peer,
           timestamp, body_after
    FROM changes
"#;

const READ_FROM: &str = r#"
    SELECT sequence, document_id, op, diff, revision_before, revision_after, origin_peer,
           timestamp, body_after
    FROM changes
    WHERE sequence > ?1
    ORDER BY sequence
    LIMIT ?2
"#;

/// Append a change and return the sequence number it was assigned.
pub async fn append_change(
    conn: &mut SqliteConnection,
    change: &NewChange,
) -> Result<Sequence, sqlx::Error> {
    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO changes (
            document_id, op, diff, revision_before, revision_after, origin_peer, timestamp,
            body_after
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING sequence
        "#,
    )
    .bind(&change.document_id)
    .bind(change.change.kind().as_str())
    .bind(change.change.diff().map(Json))
    .bind(to_i64(change.revision_before))
    .bind(to_i64(change.revision_after))
    .bind(change.origin.peer())
    .bind(to_i64(change.timestamp))
    .bind(change.body_after.as_ref().map(Json))
    .fetch_one(conn)
    .await?;

    Ok(to_u64(sequence))
}

/// Stream entries with `sequence > after` in sequence order, at most `limit`
/// of them. Rows are decoded as they arrive; restart from the last sequence
/// seen to continue.
pub fn read_from(
    pool: &Pool,
    after: Sequence,
    limit: u32,
) -> impl Stream<Item = Result<ChangeEntry, StoreError>> + Send + '_ {
    sqlx::query_as::<_, StoredChange>(READ_FROM)
        .bind(to_i64(after))
        .bind(i64::from(limit))
        .fetch(pool)
        .map(|row| row.map_err(StoreError::from).and_then(StoredChange::into_entry))
}

/// All retained entries for one document, oldest first.
pub async fn history(pool: &Pool, document_id: &str) -> Result<Vec<ChangeEntry>, StoreError> {
    let sql = format!("{} WHERE document_id = ?1 ORDER BY sequence", SELECT_CHANGES);
    let rows = sqlx::query_as::<_, StoredChange>(&sql)
        .bind(document_id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(StoredChange::into_entry).collect()
}

/// Highest sequence ever assigned, 0 for an empty log.
pub async fn last_sequence(pool: &Pool) -> Result<Sequence, sqlx::Error> {
    // sqlite_sequence survives compaction, unlike MAX(sequence) on an emptied table.
    let row = sqlx::query("SELECT seq FROM sqlite_sequence WHERE name = 'changes'")
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(to_u64(row.try_get::<i64, _>("seq")?)),
        None => Ok(0),
    }
}

/// Drop entries every peer has pulled that are older than `older_than`.
pub async fn compact_changes(
    conn: &mut SqliteConnection,
    acked_through: Sequence,
    older_than: Timestamp,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM changes WHERE sequence <= ?1 AND timestamp < ?2")
        .bind(to_i64(acked_through))
        .bind(to_i64(older_than))
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

//! Database operations for conflict records.

use super::{to_i64, to_u64, Pool};
use crate::error::StoreError;
use pakhuis_engine::{ConflictRecord, Resolution};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Store a conflict record.
pub async fn insert_conflict(
    conn: &mut SqliteConnection,
    record: &ConflictRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO conflicts (
            document_id, peer_id, remote_sequence, local_revision,
            remote_revision, resolution, timestamp
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&record.document_id)
    .bind(&record.peer)
    .bind(to_i64(record.remote_sequence))
    .bind(to_i64(record.local_revision))
    .bind(to_i64(record.remote_revision))
    .bind(record.resolution.as_str())
    .bind(to_i64(record.timestamp))
    .execute(conn)
    .await?;

    Ok(())
}

/// The most recent conflicts, newest first. Filtered to one document when
/// `document_id` is given.
pub async fn list_conflicts(
    pool: &Pool,
    document_id: Option<&str>,
    limit: u32,
) -> Result<Vec<ConflictRecord>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT document_id, peer_id, remote_sequence, local_revision,
               remote_revision, resolution, timestamp
        FROM conflicts
        WHERE ?1 IS NULL OR document_id = ?1
        ORDER BY id DESC
        LIMIT ?2
        "#,
    )
    .bind(document_id)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(conflict_from_row).collect()
}

fn conflict_from_row(row: &SqliteRow) -> Result<ConflictRecord, StoreError> {
    let resolution: String = row.try_get("resolution")?;
    Ok(ConflictRecord {
        document_id: row.try_get("document_id")?,
        peer: row.try_get("peer_id")?,
        remote_sequence: to_u64(row.try_get("remote_sequence")?),
        local_revision: to_u64(row.try_get("local_revision")?),
        remote_revision: to_u64(row.try_get("remote_revision")?),
        resolution: Resolution::parse(&resolution)
            .ok_or_else(|| StoreError::Codec(format!("unknown resolution '{}'", resolution)))?,
        timestamp: to_u64(row.try_get("timestamp")?),
    })
}

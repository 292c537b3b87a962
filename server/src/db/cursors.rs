//! Database operations for sync cursors and peer acknowledgements.

use super::{to_i64, to_u64, Pool};
use pakhuis_engine::{Sequence, SyncCursor, Timestamp};
use sqlx::{Row, SqliteConnection};

/// Load the cursor for `peer_id`, or a fresh one if it never synced.
pub async fn get_cursor(pool: &Pool, peer_id: &str) -> Result<SyncCursor, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT last_applied_remote_sequence, last_attempt_timestamp, last_error
        FROM sync_cursors
        WHERE peer_id = ?1
        "#,
    )
    .bind(peer_id)
    .fetch_optional(pool)
    .await?;

    let mut cursor = SyncCursor::new(peer_id);
    if let Some(row) = row {
        cursor.last_applied_remote_sequence = to_u64(row.try_get("last_applied_remote_sequence")?);
        cursor.last_attempt_timestamp = row
            .try_get::<Option<i64>, _>("last_attempt_timestamp")?
            .map(to_u64);
        cursor.last_error = row.try_get("last_error")?;
    }
    Ok(cursor)
}

/// Move the cursor for `peer_id` forward to `sequence`. Never moves it back.
pub async fn advance_cursor(
    conn: &mut SqliteConnection,
    peer_id: &str,
    sequence: Sequence,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_cursors (peer_id, last_applied_remote_sequence)
        VALUES (?1, ?2)
        ON CONFLICT (peer_id) DO UPDATE SET
            last_applied_remote_sequence =
                MAX(last_applied_remote_sequence, excluded.last_applied_remote_sequence)
        "#,
    )
    .bind(peer_id)
    .bind(to_i64(sequence))
    .execute(conn)
    .await?;

    Ok(())
}

/// Record when a sync attempt against `peer_id` ran and how it ended.
pub async fn record_attempt(
    pool: &Pool,
    peer_id: &str,
    timestamp: Timestamp,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_cursors (peer_id, last_attempt_timestamp, last_error)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (peer_id) DO UPDATE SET
            last_attempt_timestamp = excluded.last_attempt_timestamp,
            last_error = excluded.last_error
        "#,
    )
    .bind(peer_id)
    .bind(to_i64(timestamp))
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remember that `peer_id` has pulled everything up to `sequence`.
pub async fn record_ack(
    pool: &Pool,
    peer_id: &str,
    sequence: Sequence,
    timestamp: Timestamp,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO peer_acks (peer_id, acked_sequence, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (peer_id) DO UPDATE SET
            acked_sequence = MAX(acked_sequence, excluded.acked_sequence),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(peer_id)
    .bind(to_i64(sequence))
    .bind(to_i64(timestamp))
    .execute(pool)
    .await?;

    Ok(())
}

/// The lowest acknowledged sequence across `peers`. A peer that never
/// pulled counts as 0.
pub async fn min_ack(pool: &Pool, peers: &[String]) -> Result<Sequence, sqlx::Error> {
    let mut min: Option<Sequence> = None;
    for peer in peers {
        let acked: Option<i64> =
            sqlx::query_scalar("SELECT acked_sequence FROM peer_acks WHERE peer_id = ?1")
                .bind(peer)
                .fetch_optional(pool)
                .await?;
        let acked = acked.map(to_u64).unwrap_or(0);
        min = Some(min.map_or(acked, |m| m.min(acked)));
    }
    Ok(min.unwrap_or(0))
}

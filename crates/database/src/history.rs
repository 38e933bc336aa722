//! Append-only offer audit history.

use sqlx::SqlitePool;

use crate::models::OfferHistoryEntry;
use crate::Result;

/// Append an audit entry.
pub async fn append(pool: &SqlitePool, entry: &OfferHistoryEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO offer_history (id, offer_id, action_type, action_by, action_details, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.offer_id)
    .bind(entry.action_type)
    .bind(&entry.action_by)
    .bind(&entry.action_details)
    .bind(entry.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Full thread history for one offer, oldest first.
///
/// The `rowid` tie-break keeps same-instant entries (the countered pair) in
/// insertion order.
pub async fn list_for_offer(
    pool: &SqlitePool,
    offer_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<OfferHistoryEntry>> {
    let rows = sqlx::query_as::<_, OfferHistoryEntry>(
        r#"
        SELECT id, offer_id, action_type, action_by, action_details, created_at
        FROM offer_history
        WHERE offer_id = ?
        ORDER BY created_at, rowid
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(offer_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// An actor's activity feed across all offers, newest first.
pub async fn list_for_actor(
    pool: &SqlitePool,
    actor: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<OfferHistoryEntry>> {
    let rows = sqlx::query_as::<_, OfferHistoryEntry>(
        r#"
        SELECT id, offer_id, action_type, action_by, action_details, created_at
        FROM offer_history
        WHERE action_by = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(actor)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

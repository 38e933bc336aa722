//! Offer storage: inserts, conditional status transitions, and scans.
//!
//! Status is only ever written through [`transition`] (or its transactional
//! wrapper [`counter_exchange`]), so every caller races through the same
//! conditional update and the row count decides the winner.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{Offer, OfferRole, OfferStatus};

/// Insert a new offer.
///
/// A buyer with a pending offer on the same listing trips the partial unique
/// index and gets [`DatabaseError::AlreadyExists`].
pub async fn insert(pool: &SqlitePool, offer: &Offer) -> Result<()> {
    insert_with(pool, offer).await
}

async fn insert_with<'e, E>(executor: E, offer: &Offer) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO offers (
            id, listing_id, buyer_id, seller_id, offer_amount, status,
            cash_offer, financing_needed, inspection_contingency, message,
            original_offer_id, counter_offer_count, expires_at,
            accepted_at, rejected_at, expired_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&offer.id)
    .bind(&offer.listing_id)
    .bind(&offer.buyer_id)
    .bind(&offer.seller_id)
    .bind(offer.offer_amount)
    .bind(offer.status)
    .bind(offer.terms.cash_offer)
    .bind(offer.terms.financing_needed)
    .bind(offer.terms.inspection_contingency)
    .bind(&offer.message)
    .bind(&offer.original_offer_id)
    .bind(offer.counter_offer_count)
    .bind(offer.expires_at)
    .bind(offer.accepted_at)
    .bind(offer.rejected_at)
    .bind(offer.expired_at)
    .bind(offer.created_at)
    .bind(offer.updated_at)
    .execute(executor)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "PendingOffer",
                    id: format!("{}:{}", offer.listing_id, offer.buyer_id),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(())
}

/// Get an offer by ID.
pub async fn get(pool: &SqlitePool, id: &str) -> Result<Offer> {
    sqlx::query_as::<_, Offer>(
        r#"
        SELECT id, listing_id, buyer_id, seller_id, offer_amount, status,
               cash_offer, financing_needed, inspection_contingency, message,
               original_offer_id, counter_offer_count, expires_at,
               accepted_at, rejected_at, expired_at, created_at, updated_at
        FROM offers
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Offer",
        id: id.to_string(),
    })
}

/// Find a buyer's pending offer on a listing, if one exists.
pub async fn find_pending_for_buyer(
    pool: &SqlitePool,
    listing_id: &str,
    buyer_id: &str,
) -> Result<Option<Offer>> {
    let offer = sqlx::query_as::<_, Offer>(
        r#"
        SELECT id, listing_id, buyer_id, seller_id, offer_amount, status,
               cash_offer, financing_needed, inspection_contingency, message,
               original_offer_id, counter_offer_count, expires_at,
               accepted_at, rejected_at, expired_at, created_at, updated_at
        FROM offers
        WHERE listing_id = ? AND buyer_id = ? AND status = 'pending'
        "#,
    )
    .bind(listing_id)
    .bind(buyer_id)
    .fetch_optional(pool)
    .await?;

    Ok(offer)
}

/// Conditionally transition a pending offer to a terminal status.
///
/// The engine's single concurrency-control primitive: the update only
/// applies while the row is still `pending`, and the returned flag tells the
/// caller whether it won or lost the race. `now` stamps `updated_at` plus
/// the timestamp column matching the target status, when one exists.
pub async fn transition(
    pool: &SqlitePool,
    offer_id: &str,
    to: OfferStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    transition_with(pool, offer_id, to, now).await
}

async fn transition_with<'e, E>(
    executor: E,
    offer_id: &str,
    to: OfferStatus,
    now: DateTime<Utc>,
) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let stamp = match to {
        OfferStatus::Accepted => Some("accepted_at"),
        OfferStatus::Rejected => Some("rejected_at"),
        OfferStatus::Expired => Some("expired_at"),
        OfferStatus::Withdrawn | OfferStatus::Countered => None,
        OfferStatus::Pending => {
            return Err(DatabaseError::InvalidTransition {
                id: offer_id.to_string(),
                status: to.as_str(),
            });
        }
    };

    let result = match stamp {
        Some(column) => {
            sqlx::query(&format!(
                r#"
                UPDATE offers
                SET status = ?, {column} = ?, updated_at = ?
                WHERE id = ? AND status = 'pending'
                "#
            ))
            .bind(to)
            .bind(now)
            .bind(now)
            .bind(offer_id)
            .execute(executor)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                UPDATE offers
                SET status = ?, updated_at = ?
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(to)
            .bind(now)
            .bind(offer_id)
            .execute(executor)
            .await?
        }
    };

    Ok(result.rows_affected() > 0)
}

/// Atomically retire a pending offer and insert its successor.
///
/// The conditional `pending -> countered` update and the successor insert
/// commit together. When the original has already left `pending`, the
/// transaction rolls back and `Ok(false)` is returned so the caller can
/// report the lost race; the successor is never visible without the
/// predecessor's retirement.
pub async fn counter_exchange(
    pool: &SqlitePool,
    original_id: &str,
    successor: &Offer,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let won = transition_with(
        &mut *tx,
        original_id,
        OfferStatus::Countered,
        successor.created_at,
    )
    .await?;
    if !won {
        tx.rollback().await?;
        return Ok(false);
    }

    insert_with(&mut *tx, successor).await?;
    tx.commit().await?;

    Ok(true)
}

/// List offers an actor participates in, newest first.
pub async fn list_for_actor(
    pool: &SqlitePool,
    actor: &str,
    role: Option<OfferRole>,
    status: Option<OfferStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Offer>> {
    let mut query = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT id, listing_id, buyer_id, seller_id, offer_amount, status,
               cash_offer, financing_needed, inspection_contingency, message,
               original_offer_id, counter_offer_count, expires_at,
               accepted_at, rejected_at, expired_at, created_at, updated_at
        FROM offers
        WHERE "#,
    );

    match role {
        Some(OfferRole::Buyer) => {
            query.push("buyer_id = ").push_bind(actor);
        }
        Some(OfferRole::Seller) => {
            query.push("seller_id = ").push_bind(actor);
        }
        None => {
            query
                .push("(buyer_id = ")
                .push_bind(actor)
                .push(" OR seller_id = ")
                .push_bind(actor)
                .push(")");
        }
    }

    if let Some(status) = status {
        query.push(" AND status = ").push_bind(status);
    }

    query
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let offers = query.build_query_as::<Offer>().fetch_all(pool).await?;

    Ok(offers)
}

/// Select a batch of pending offers whose deadline has passed.
///
/// The sweeper calls this repeatedly with a bounded limit instead of holding
/// one long scan open while transitions race with live traffic.
pub async fn select_expired_batch(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Offer>> {
    let offers = sqlx::query_as::<_, Offer>(
        r#"
        SELECT id, listing_id, buyer_id, seller_id, offer_amount, status,
               cash_offer, financing_needed, inspection_contingency, message,
               original_offer_id, counter_offer_count, expires_at,
               accepted_at, rejected_at, expired_at, created_at, updated_at
        FROM offers
        WHERE status = 'pending' AND expires_at <= ?
        ORDER BY expires_at
        LIMIT ?
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(offers)
}

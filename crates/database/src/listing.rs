//! Listing storage.
//!
//! The negotiation engine treats the catalog as a collaborator: it reads a
//! listing to validate an offer and conditionally flips `active -> sold`
//! when one is accepted. Hosts and tests seed rows with [`create`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Listing, ListingStatus};

/// Create a new listing.
pub async fn create(pool: &SqlitePool, listing: &Listing) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO listings (id, owner_id, title, price, status, sold_price, sold_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&listing.id)
    .bind(&listing.owner_id)
    .bind(&listing.title)
    .bind(listing.price)
    .bind(listing.status)
    .bind(listing.sold_price)
    .bind(listing.sold_at)
    .bind(listing.created_at)
    .bind(listing.updated_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "Listing",
                    id: listing.id.clone(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(())
}

/// Get a listing by ID.
pub async fn get(pool: &SqlitePool, id: &str) -> Result<Listing> {
    try_get(pool, id).await?.ok_or_else(|| DatabaseError::NotFound {
        entity: "Listing",
        id: id.to_string(),
    })
}

/// Get a listing by ID, or `None` if absent.
pub async fn try_get(pool: &SqlitePool, id: &str) -> Result<Option<Listing>> {
    let listing = sqlx::query_as::<_, Listing>(
        r#"
        SELECT id, owner_id, title, price, status, sold_price, sold_at, created_at, updated_at
        FROM listings
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(listing)
}

/// Conditionally mark an active listing sold at the given price.
///
/// Returns whether the row was still active; an already-sold or inactive
/// listing is left untouched.
pub async fn mark_sold(
    pool: &SqlitePool,
    id: &str,
    sale_price: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE listings
        SET status = ?, sold_price = ?, sold_at = ?, updated_at = ?
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(ListingStatus::Sold)
    .bind(sale_price)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

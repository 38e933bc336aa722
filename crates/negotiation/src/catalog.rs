//! Listing catalog seam.
//!
//! The engine only needs two things from the catalog: enough of a listing to
//! validate a new offer, and a way to flip it to sold when an offer is
//! accepted. Hosts plug in whatever backs their catalog; [`SqliteCatalog`]
//! covers deployments where listings live in the same Souk database.

use async_trait::async_trait;
use chrono::Utc;
use database::models::ListingStatus;
use database::{listing, Database};
use thiserror::Error;

/// Errors from a listing catalog backend.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Backend lookup or write failed.
    #[error("catalog error: {0}")]
    Backend(String),

    /// The listing exists but is no longer active.
    #[error("listing {0} is not active")]
    NotActive(String),
}

/// The slice of a listing the engine consults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingInfo {
    pub id: String,
    pub owner_id: String,
    pub active: bool,
}

/// Read/mark-sold surface of the listing catalog.
#[async_trait]
pub trait ListingCatalog: Send + Sync {
    /// Look up a listing, or `None` if it does not exist.
    async fn get(&self, listing_id: &str) -> Result<Option<ListingInfo>, CatalogError>;

    /// Mark an active listing sold at the given price.
    async fn mark_sold(&self, listing_id: &str, sale_price: i64) -> Result<(), CatalogError>;
}

/// Catalog backed by the local `listings` table.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    db: Database,
}

impl SqliteCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListingCatalog for SqliteCatalog {
    async fn get(&self, listing_id: &str) -> Result<Option<ListingInfo>, CatalogError> {
        let row = listing::try_get(self.db.pool(), listing_id)
            .await
            .map_err(|e| CatalogError::Backend(e.to_string()))?;

        Ok(row.map(|l| ListingInfo {
            active: l.status == ListingStatus::Active,
            id: l.id,
            owner_id: l.owner_id,
        }))
    }

    async fn mark_sold(&self, listing_id: &str, sale_price: i64) -> Result<(), CatalogError> {
        let updated = listing::mark_sold(self.db.pool(), listing_id, sale_price, Utc::now())
            .await
            .map_err(|e| CatalogError::Backend(e.to_string()))?;

        if updated {
            Ok(())
        } else {
            Err(CatalogError::NotActive(listing_id.to_string()))
        }
    }
}

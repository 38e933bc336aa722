//! Offer negotiation engine for Souk.
//!
//! This crate implements the lifecycle of a purchase offer between a buyer
//! and a seller: counter-offers, acceptance, rejection, withdrawal,
//! automatic expiration, and a full audit trail.
//!
//! # State machine
//!
//! ```text
//! pending -> accepted    (seller action)
//! pending -> rejected    (seller action)
//! pending -> withdrawn   (buyer action)
//! pending -> countered   (either party; spawns a new pending offer)
//! pending -> expired     (sweeper or lazy expiration on read)
//! ```
//!
//! Terminal states are permanent. Every transition goes through one
//! conditional update in the store (`UPDATE ... WHERE status = 'pending'`),
//! so concurrent user actions and the background sweeper race safely with no
//! locks: whoever's update affects a row wins, everyone else sees a
//! conflict. Operations are plain futures; cancelling one before its
//! conditional write commits leaves no partial state behind.
//!
//! # Example
//!
//! ```no_run
//! use database::Database;
//! use database::models::OfferTerms;
//! use negotiation::{NegotiationConfig, NegotiationService, NewOffer, SqliteCatalog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NegotiationConfig::from_env()?;
//!     let db = Database::connect(&config.sqlite_url).await?;
//!     db.migrate().await?;
//!
//!     let service = NegotiationService::new(db.clone(), SqliteCatalog::new(db), config);
//!     tokio::spawn(service.sweeper().run());
//!
//!     let offer = service
//!         .create_offer(
//!             "buyer-1",
//!             NewOffer {
//!                 listing_id: "listing-1".to_string(),
//!                 amount: 15_000,
//!                 terms: OfferTerms::default(),
//!                 message: Some("Would you take 15k?".to_string()),
//!             },
//!         )
//!         .await?;
//!     println!("offer {} expires at {}", offer.id, offer.expires_at);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod service;
pub mod sweeper;

pub use auth::{authorize, OfferAction};
pub use catalog::{CatalogError, ListingCatalog, ListingInfo, SqliteCatalog};
pub use config::NegotiationConfig;
pub use error::{NegotiationError, Result};
pub use events::{OfferEvent, OfferRef};
pub use service::{
    CounterOffer, NegotiationService, NewOffer, OfferFilter, OfferResponse, Page, RespondOutcome,
};
pub use sweeper::ExpirationSweeper;

/// Actor id recorded for transitions no user initiated (expirations).
pub const SYSTEM_ACTOR: &str = "system";

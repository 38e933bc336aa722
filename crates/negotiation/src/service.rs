//! Negotiation service: the offer lifecycle operations.
//!
//! Every status change funnels through the store's conditional-update
//! primitive, so a user action and a concurrent sweep can both try the same
//! transition and exactly one of them wins. History rows are appended after
//! the transition commits; a history failure is surfaced as an internal
//! error but never reverts the transition.

use chrono::{DateTime, Duration, Utc};
use database::models::{HistoryAction, Offer, OfferRole, OfferStatus, OfferTerms};
use database::{history, offer, Database};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{authorize, OfferAction};
use crate::catalog::{CatalogError, ListingCatalog};
use crate::config::NegotiationConfig;
use crate::error::{NegotiationError, Result};
use crate::events::{self, OfferEvent, OfferRef};
use crate::sweeper::ExpirationSweeper;
use crate::SYSTEM_ACTOR;

/// Longest free-text message accepted on an offer or rejection.
const MAX_MESSAGE_LEN: usize = 2_000;

/// Input for a new offer.
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub listing_id: String,
    pub amount: i64,
    pub terms: OfferTerms,
    pub message: Option<String>,
}

/// Input for a counter-offer superseding a pending one.
#[derive(Debug, Clone)]
pub struct CounterOffer {
    pub original_offer_id: String,
    pub amount: i64,
    pub terms: OfferTerms,
    pub message: Option<String>,
}

/// A response to a pending offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferResponse {
    Accept,
    Reject,
    Withdraw,
}

impl OfferResponse {
    fn action(self) -> OfferAction {
        match self {
            OfferResponse::Accept => OfferAction::Accept,
            OfferResponse::Reject => OfferAction::Reject,
            OfferResponse::Withdraw => OfferAction::Withdraw,
        }
    }

    fn target_status(self) -> OfferStatus {
        match self {
            OfferResponse::Accept => OfferStatus::Accepted,
            OfferResponse::Reject => OfferStatus::Rejected,
            OfferResponse::Withdraw => OfferStatus::Withdrawn,
        }
    }

    fn history_action(self) -> HistoryAction {
        match self {
            OfferResponse::Accept => HistoryAction::Accepted,
            OfferResponse::Reject => HistoryAction::Rejected,
            OfferResponse::Withdraw => HistoryAction::Withdrawn,
        }
    }
}

/// Outcome of [`NegotiationService::respond_to_offer`].
///
/// The primary outcome (the transitioned offer) and the best-effort
/// side effect are reported separately: a failed catalog update never rolls
/// back an acceptance, it is logged and handed to the caller here for
/// out-of-band reconciliation.
#[derive(Debug)]
pub struct RespondOutcome {
    pub offer: Offer,
    /// Set when accepting committed but marking the listing sold failed.
    pub catalog_failure: Option<CatalogError>,
}

/// Role and status filters for listing offers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferFilter {
    pub role: Option<OfferRole>,
    pub status: Option<OfferStatus>,
}

/// Pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    const MAX_LIMIT: i64 = 100;

    fn validate(&self) -> Result<()> {
        if self.limit < 1 || self.limit > Self::MAX_LIMIT {
            return Err(NegotiationError::Validation(format!(
                "page limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        if self.offset < 0 {
            return Err(NegotiationError::Validation(
                "page offset must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// The offer negotiation engine.
///
/// Holds the offer store, the listing catalog collaborator, and the event
/// channel. Cheap to share behind an `Arc` across request handlers; all
/// coordination happens in the store.
pub struct NegotiationService<C: ListingCatalog> {
    db: Database,
    catalog: C,
    config: NegotiationConfig,
    events: broadcast::Sender<OfferEvent>,
}

impl<C: ListingCatalog> NegotiationService<C> {
    /// Create a new service over a connected database.
    pub fn new(db: Database, catalog: C, config: NegotiationConfig) -> Self {
        Self {
            db,
            catalog,
            config,
            events: events::channel(),
        }
    }

    /// Subscribe to domain events emitted on committed transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<OfferEvent> {
        self.events.subscribe()
    }

    /// An expiration sweeper wired to this service's database and events.
    pub fn sweeper(&self) -> ExpirationSweeper {
        ExpirationSweeper::new(self.db.clone(), &self.config).with_events(self.events.clone())
    }

    /// Create a new offer from `actor` on a listing.
    pub async fn create_offer(&self, actor: &str, input: NewOffer) -> Result<Offer> {
        validate_amount(input.amount)?;
        validate_message(input.message.as_deref())?;

        let listing = self
            .catalog
            .get(&input.listing_id)
            .await
            .map_err(|e| NegotiationError::Internal(format!("listing lookup failed: {e}")))?
            .ok_or_else(|| NegotiationError::NotFound {
                entity: "Listing",
                id: input.listing_id.clone(),
            })?;

        if !listing.active {
            return Err(NegotiationError::InvalidState(format!(
                "listing {} is not open to offers",
                listing.id
            )));
        }
        if listing.owner_id == actor {
            return Err(NegotiationError::InvalidState(
                "cannot make an offer on your own listing".to_string(),
            ));
        }

        if let Some(existing) =
            offer::find_pending_for_buyer(self.db.pool(), &input.listing_id, actor).await?
        {
            return Err(NegotiationError::Conflict(format!(
                "buyer already has pending offer {} on listing {}",
                existing.id, input.listing_id
            )));
        }

        let now = Utc::now();
        let new_offer = Offer {
            id: Uuid::new_v4().to_string(),
            listing_id: input.listing_id,
            buyer_id: actor.to_string(),
            seller_id: listing.owner_id,
            offer_amount: input.amount,
            status: OfferStatus::Pending,
            terms: input.terms,
            message: input.message,
            original_offer_id: None,
            counter_offer_count: 0,
            expires_at: now + ttl(&self.config),
            accepted_at: None,
            rejected_at: None,
            expired_at: None,
            created_at: now,
            updated_at: now,
        };

        // The partial unique index backstops the pending check above, so a
        // racing duplicate surfaces as a conflict instead of a second row.
        offer::insert(self.db.pool(), &new_offer).await?;

        self.append_history(
            &new_offer.id,
            HistoryAction::Created,
            actor,
            json!({
                "offer_amount": new_offer.offer_amount,
                "terms": new_offer.terms,
                "expires_at": new_offer.expires_at.to_rfc3339(),
            }),
        )
        .await?;

        info!(
            offer_id = %new_offer.id,
            listing_id = %new_offer.listing_id,
            buyer_id = %new_offer.buyer_id,
            amount = new_offer.offer_amount,
            "offer created"
        );
        events::publish(&self.events, OfferEvent::Created(OfferRef::from(&new_offer)));

        Ok(new_offer)
    }

    /// Retire a pending offer with a counter-offer from either party.
    ///
    /// The successor swaps the predecessor's buyer and seller: the actor's
    /// counter-party stays the counter-party, and the proposing role changes
    /// hands. Both moves commit atomically in the store.
    pub async fn create_counter_offer(&self, actor: &str, input: CounterOffer) -> Result<Offer> {
        validate_amount(input.amount)?;
        validate_message(input.message.as_deref())?;

        let original = offer::get(self.db.pool(), &input.original_offer_id).await?;

        let now = Utc::now();
        if original.is_past_deadline(now) {
            self.expire_lazily(&original, now).await?;
            return Err(self.invalid_state_now(&original.id).await?);
        }
        if original.status != OfferStatus::Pending {
            return Err(NegotiationError::InvalidState(format!(
                "offer {} is {}",
                original.id, original.status
            )));
        }

        authorize(actor, &original, OfferAction::Counter)?;

        let successor = Offer {
            id: Uuid::new_v4().to_string(),
            listing_id: original.listing_id.clone(),
            buyer_id: original.seller_id.clone(),
            seller_id: original.buyer_id.clone(),
            offer_amount: input.amount,
            status: OfferStatus::Pending,
            terms: input.terms,
            message: input.message,
            original_offer_id: Some(original.id.clone()),
            counter_offer_count: original.counter_offer_count + 1,
            expires_at: now + ttl(&self.config),
            accepted_at: None,
            rejected_at: None,
            expired_at: None,
            created_at: now,
            updated_at: now,
        };

        let won = offer::counter_exchange(self.db.pool(), &original.id, &successor).await?;
        if !won {
            let current = offer::get(self.db.pool(), &original.id).await?;
            return Err(NegotiationError::Conflict(format!(
                "offer {} moved to {} before the counter",
                original.id, current.status
            )));
        }

        // Original first: a reader following the successor's back-link can
        // always resolve the retirement it points at.
        self.append_history(
            &original.id,
            HistoryAction::Countered,
            actor,
            json!({
                "countered_by_offer": successor.id,
                "counter_amount": successor.offer_amount,
            }),
        )
        .await?;
        self.append_history(
            &successor.id,
            HistoryAction::Countered,
            actor,
            json!({
                "counters_offer": original.id,
                "offer_amount": successor.offer_amount,
                "counter_offer_count": successor.counter_offer_count,
                "terms": successor.terms,
            }),
        )
        .await?;

        info!(
            offer_id = %successor.id,
            original_offer_id = %original.id,
            actor = %actor,
            amount = successor.offer_amount,
            round = successor.counter_offer_count,
            "counter-offer created"
        );
        events::publish(
            &self.events,
            OfferEvent::Countered {
                original: OfferRef::from(&original),
                successor: OfferRef::from(&successor),
            },
        );

        Ok(successor)
    }

    /// Accept, reject, or withdraw a pending offer.
    pub async fn respond_to_offer(
        &self,
        actor: &str,
        offer_id: &str,
        response: OfferResponse,
        rejection_reason: Option<String>,
    ) -> Result<RespondOutcome> {
        validate_message(rejection_reason.as_deref())?;

        let loaded = offer::get(self.db.pool(), offer_id).await?;

        let now = Utc::now();
        if loaded.is_past_deadline(now) {
            self.expire_lazily(&loaded, now).await?;
            return Err(self.invalid_state_now(offer_id).await?);
        }
        if loaded.status != OfferStatus::Pending {
            return Err(NegotiationError::InvalidState(format!(
                "offer {} is {}",
                loaded.id, loaded.status
            )));
        }

        authorize(actor, &loaded, response.action())?;

        let target = response.target_status();
        let won = offer::transition(self.db.pool(), offer_id, target, now).await?;
        if !won {
            let current = offer::get(self.db.pool(), offer_id).await?;
            return Err(NegotiationError::Conflict(format!(
                "offer {} already moved to {}",
                offer_id, current.status
            )));
        }

        // Best effort: the acceptance committed above and stands regardless
        // of whether the catalog write goes through.
        let mut catalog_failure = None;
        if response == OfferResponse::Accept {
            if let Err(e) = self
                .catalog
                .mark_sold(&loaded.listing_id, loaded.offer_amount)
                .await
            {
                warn!(
                    offer_id = %offer_id,
                    listing_id = %loaded.listing_id,
                    error = %e,
                    "offer accepted but listing could not be marked sold"
                );
                catalog_failure = Some(e);
            }
        }

        let mut details = json!({
            "old_status": OfferStatus::Pending,
            "new_status": target,
            "offer_amount": loaded.offer_amount,
        });
        if let Some(reason) = &rejection_reason {
            details["rejection_reason"] = json!(reason);
        }
        self.append_history(offer_id, response.history_action(), actor, details)
            .await?;

        let updated = offer::get(self.db.pool(), offer_id).await?;
        info!(
            offer_id = %offer_id,
            actor = %actor,
            status = %updated.status,
            "offer responded"
        );
        let offer_ref = OfferRef::from(&updated);
        let event = match response {
            OfferResponse::Accept => OfferEvent::Accepted(offer_ref),
            OfferResponse::Reject => OfferEvent::Rejected(offer_ref),
            OfferResponse::Withdraw => OfferEvent::Withdrawn(offer_ref),
        };
        events::publish(&self.events, event);

        Ok(RespondOutcome {
            offer: updated,
            catalog_failure,
        })
    }

    /// Get one offer; participants only.
    pub async fn get_offer(&self, actor: &str, offer_id: &str) -> Result<Offer> {
        let loaded = offer::get(self.db.pool(), offer_id).await?;
        if !loaded.is_participant(actor) {
            return Err(NegotiationError::Forbidden(format!(
                "actor {actor} is not a participant in offer {offer_id}"
            )));
        }
        Ok(loaded)
    }

    /// List the actor's offers, optionally filtered by role and status.
    pub async fn list_offers(
        &self,
        actor: &str,
        filter: OfferFilter,
        page: Page,
    ) -> Result<Vec<Offer>> {
        page.validate()?;
        let offers = offer::list_for_actor(
            self.db.pool(),
            actor,
            filter.role,
            filter.status,
            page.limit,
            page.offset,
        )
        .await?;
        Ok(offers)
    }

    /// Full audit thread for one offer, oldest first; participants only.
    pub async fn history_for_offer(
        &self,
        actor: &str,
        offer_id: &str,
        page: Page,
    ) -> Result<Vec<database::models::OfferHistoryEntry>> {
        page.validate()?;
        let loaded = offer::get(self.db.pool(), offer_id).await?;
        if !loaded.is_participant(actor) {
            return Err(NegotiationError::Forbidden(format!(
                "actor {actor} is not a participant in offer {offer_id}"
            )));
        }
        let entries =
            history::list_for_offer(self.db.pool(), offer_id, page.limit, page.offset).await?;
        Ok(entries)
    }

    /// The actor's own activity feed across offers, newest first.
    pub async fn history_for_actor(
        &self,
        actor: &str,
        page: Page,
    ) -> Result<Vec<database::models::OfferHistoryEntry>> {
        page.validate()?;
        let entries =
            history::list_for_actor(self.db.pool(), actor, page.limit, page.offset).await?;
        Ok(entries)
    }

    /// Expire an offer discovered past its deadline on a read path.
    ///
    /// Same conditional transition the sweeper uses; losing the race here
    /// just means someone else settled the offer first.
    async fn expire_lazily(&self, loaded: &Offer, now: DateTime<Utc>) -> Result<()> {
        let won = offer::transition(self.db.pool(), &loaded.id, OfferStatus::Expired, now).await?;
        if won {
            self.append_history(
                &loaded.id,
                HistoryAction::Expired,
                SYSTEM_ACTOR,
                json!({
                    "expires_at": loaded.expires_at.to_rfc3339(),
                    "swept": false,
                }),
            )
            .await?;
            info!(offer_id = %loaded.id, "offer expired on read");
            events::publish(&self.events, OfferEvent::Expired(OfferRef::from(loaded)));
        }
        Ok(())
    }

    /// An `InvalidState` error naming the offer's status as of now.
    async fn invalid_state_now(&self, offer_id: &str) -> Result<NegotiationError> {
        let current = offer::get(self.db.pool(), offer_id).await?;
        Ok(NegotiationError::InvalidState(format!(
            "offer {} is {}",
            offer_id, current.status
        )))
    }

    async fn append_history(
        &self,
        offer_id: &str,
        action: HistoryAction,
        actor: &str,
        details: serde_json::Value,
    ) -> Result<()> {
        let entry = database::models::OfferHistoryEntry {
            id: Uuid::new_v4().to_string(),
            offer_id: offer_id.to_string(),
            action_type: action,
            action_by: actor.to_string(),
            action_details: Some(details.to_string()),
            created_at: Utc::now(),
        };
        history::append(self.db.pool(), &entry).await?;
        Ok(())
    }
}

fn ttl(config: &NegotiationConfig) -> Duration {
    Duration::seconds(config.offer_ttl.as_secs() as i64)
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(NegotiationError::Validation(
            "offer amount must be positive".to_string(),
        ));
    }
    Ok(())
}

fn validate_message(message: Option<&str>) -> Result<()> {
    if let Some(text) = message {
        if text.len() > MAX_MESSAGE_LEN {
            return Err(NegotiationError::Validation(format!(
                "message exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }
    }
    Ok(())
}

//! Domain events emitted on offer transitions.
//!
//! The engine publishes one event per committed transition on a broadcast
//! channel. Delivery to buyers and sellers (push, e-mail, whatever the host
//! wires up) is a subscriber's job; a send with no subscribers is normal.

use database::models::Offer;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Identifying snapshot of an offer carried inside events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRef {
    pub offer_id: String,
    pub listing_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub offer_amount: i64,
}

impl From<&Offer> for OfferRef {
    fn from(offer: &Offer) -> Self {
        Self {
            offer_id: offer.id.clone(),
            listing_id: offer.listing_id.clone(),
            buyer_id: offer.buyer_id.clone(),
            seller_id: offer.seller_id.clone(),
            offer_amount: offer.offer_amount,
        }
    }
}

/// A committed offer transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfferEvent {
    Created(OfferRef),
    Countered { original: OfferRef, successor: OfferRef },
    Accepted(OfferRef),
    Rejected(OfferRef),
    Withdrawn(OfferRef),
    Expired(OfferRef),
}

/// Create the engine's event channel.
pub fn channel() -> broadcast::Sender<OfferEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Publish an event, tolerating the no-subscriber case.
pub(crate) fn publish(sender: &broadcast::Sender<OfferEvent>, event: OfferEvent) {
    if sender.send(event).is_err() {
        debug!("no event subscribers; offer event dropped");
    }
}

//! Role checks for offer transitions.

use database::models::Offer;

use crate::error::NegotiationError;

/// A transition an actor can request on a pending offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferAction {
    Accept,
    Reject,
    Withdraw,
    Counter,
}

impl OfferAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferAction::Accept => "accept",
            OfferAction::Reject => "reject",
            OfferAction::Withdraw => "withdraw",
            OfferAction::Counter => "counter",
        }
    }
}

/// Decide whether `actor` may perform `action` on an already-loaded offer.
///
/// Withdrawing is the buyer's move, accepting and rejecting are the
/// seller's, and either party may counter. Pure role check; storage is
/// never consulted.
pub fn authorize(actor: &str, offer: &Offer, action: OfferAction) -> Result<(), NegotiationError> {
    let allowed = match action {
        OfferAction::Withdraw => actor == offer.buyer_id,
        OfferAction::Accept | OfferAction::Reject => actor == offer.seller_id,
        OfferAction::Counter => actor == offer.buyer_id || actor == offer.seller_id,
    };

    if allowed {
        Ok(())
    } else {
        Err(NegotiationError::Forbidden(format!(
            "actor {actor} may not {} offer {}",
            action.as_str(),
            offer.id
        )))
    }
}

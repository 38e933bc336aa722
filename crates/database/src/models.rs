//! Database models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of an offer.
///
/// `Pending` is the only non-terminal status; every transition originates
/// there. The five terminal statuses are permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
    Countered,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Withdrawn => "withdrawn",
            OfferStatus::Countered => "countered",
            OfferStatus::Expired => "expired",
        }
    }

    /// Whether no further transition may originate from this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Pending)
    }

    /// The offer state machine: `pending` may move to any terminal status,
    /// nothing else moves at all.
    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        matches!(self, OfferStatus::Pending) && next != OfferStatus::Pending
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action recorded in an offer's audit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Created,
    Countered,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Countered => "countered",
            HistoryAction::Accepted => "accepted",
            HistoryAction::Rejected => "rejected",
            HistoryAction::Withdrawn => "withdrawn",
            HistoryAction::Expired => "expired",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of an offer an actor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferRole {
    Buyer,
    Seller,
}

/// Deal terms attached to an offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OfferTerms {
    pub cash_offer: bool,
    pub financing_needed: bool,
    pub inspection_contingency: bool,
}

/// A purchase offer from a buyer to a seller for a listing.
///
/// Everything except `status`, `updated_at`, and the transition timestamps is
/// write-once at creation. `buyer_id` is the proposing party; on a
/// counter-offer the roles swap relative to the predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: String,
    pub listing_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub offer_amount: i64,
    pub status: OfferStatus,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub terms: OfferTerms,
    pub message: Option<String>,
    /// Back-reference to the offer this one supersedes, forming a
    /// counter-offer chain.
    pub original_offer_id: Option<String>,
    pub counter_offer_count: i64,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    /// Whether `actor` is the buyer or the seller of this offer.
    pub fn is_participant(&self, actor: &str) -> bool {
        actor == self.buyer_id || actor == self.seller_id
    }

    /// Whether this offer is still pending but past its deadline.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Pending && now > self.expires_at
    }
}

/// One append-only audit row per offer creation or transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OfferHistoryEntry {
    pub id: String,
    pub offer_id: String,
    pub action_type: HistoryAction,
    /// Actor id, or the `system` sentinel for time-based expirations.
    pub action_by: String,
    /// Structured JSON payload: amounts, terms, counter linkage.
    pub action_details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Status of a listing in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Sold,
    Inactive,
}

/// A listed item offers are negotiated over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Listing {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub price: i64,
    pub status: ListingStatus,
    pub sold_price: Option<i64>,
    pub sold_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OfferStatus; 6] = [
        OfferStatus::Pending,
        OfferStatus::Accepted,
        OfferStatus::Rejected,
        OfferStatus::Withdrawn,
        OfferStatus::Countered,
        OfferStatus::Expired,
    ];

    #[test]
    fn only_pending_is_non_terminal() {
        for status in ALL {
            assert_eq!(status.is_terminal(), status != OfferStatus::Pending);
        }
    }

    #[test]
    fn transition_table_is_exhaustive() {
        for from in ALL {
            for to in ALL {
                let expected = from == OfferStatus::Pending && to != OfferStatus::Pending;
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }
}

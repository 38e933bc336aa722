//! Background expiration of pending offers past their deadline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use database::models::{HistoryAction, Offer, OfferHistoryEntry, OfferStatus};
use database::{history, offer, Database};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::NegotiationConfig;
use crate::error::Result;
use crate::events::{self, OfferEvent, OfferRef};
use crate::SYSTEM_ACTOR;

/// Periodically expires pending offers whose deadline has passed.
///
/// Each candidate goes through the same conditional transition user actions
/// use, so an offer that was accepted, rejected, withdrawn, or countered in
/// the meantime simply loses the race and is skipped. Running a sweep twice
/// never double-counts or double-logs an offer.
pub struct ExpirationSweeper {
    db: Database,
    sweep_interval: Duration,
    batch_size: i64,
    events: Option<broadcast::Sender<OfferEvent>>,
}

impl ExpirationSweeper {
    /// Create a sweeper over a connected database.
    pub fn new(db: Database, config: &NegotiationConfig) -> Self {
        Self {
            db,
            sweep_interval: config.sweep_interval,
            batch_size: config.sweep_batch_size,
            events: None,
        }
    }

    /// Emit `Expired` events on the given channel.
    pub fn with_events(mut self, sender: broadcast::Sender<OfferEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Expire every pending offer past its deadline.
    ///
    /// Returns the number of offers this call actually transitioned. Scans
    /// in bounded batches so live traffic races against short statements,
    /// never one long cursor.
    pub async fn sweep_once(&self) -> Result<u64> {
        let mut expired = 0u64;

        loop {
            let now = Utc::now();
            let batch = offer::select_expired_batch(self.db.pool(), now, self.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as i64;

            for candidate in batch {
                let won =
                    offer::transition(self.db.pool(), &candidate.id, OfferStatus::Expired, now)
                        .await?;
                if !won {
                    // Settled by a concurrent user action between the scan
                    // and the update; expected, not an error.
                    debug!(offer_id = %candidate.id, "offer settled before expiration, skipping");
                    continue;
                }
                self.log_expiration(&candidate, now).await?;
                expired += 1;
            }

            if batch_len < self.batch_size {
                break;
            }
        }

        if expired > 0 {
            info!(expired, "expiration sweep transitioned offers");
        }
        Ok(expired)
    }

    /// Run the sweeper on its configured interval until the task is dropped.
    pub async fn run(self) {
        info!(interval = ?self.sweep_interval, "starting expiration sweeper");
        let mut ticker = interval(self.sweep_interval);

        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(count) => debug!(expired = count, "sweep cycle complete"),
                Err(e) => {
                    error!(error = %e, "sweep cycle failed");
                    // Keep sweeping; the next cycle retries what's left
                }
            }
        }
    }

    async fn log_expiration(&self, candidate: &Offer, now: DateTime<Utc>) -> Result<()> {
        let entry = OfferHistoryEntry {
            id: Uuid::new_v4().to_string(),
            offer_id: candidate.id.clone(),
            action_type: HistoryAction::Expired,
            action_by: SYSTEM_ACTOR.to_string(),
            action_details: Some(
                json!({
                    "expires_at": candidate.expires_at.to_rfc3339(),
                    "swept": true,
                })
                .to_string(),
            ),
            created_at: now,
        };
        history::append(self.db.pool(), &entry).await?;

        if let Some(sender) = &self.events {
            events::publish(sender, OfferEvent::Expired(OfferRef::from(candidate)));
        }
        Ok(())
    }
}

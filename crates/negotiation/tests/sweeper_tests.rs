//! Integration tests for expiration: the background sweep, lazy expiration
//! on read paths, idempotence, and the races between user actions and the
//! sweeper over the same conditional update.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use database::models::{HistoryAction, Listing, ListingStatus, OfferStatus, OfferTerms};
use database::{history, listing, offer, Database};
use negotiation::{
    NegotiationConfig, NegotiationError, NegotiationService, NewOffer, OfferEvent, OfferResponse,
    SqliteCatalog, SYSTEM_ACTOR,
};
use tempfile::TempDir;

/// Offers created through this config expire as soon as they are created.
fn instant_expiry_config() -> NegotiationConfig {
    NegotiationConfig {
        offer_ttl: Duration::ZERO,
        ..Default::default()
    }
}

async fn setup_with(
    mut config: NegotiationConfig,
) -> (TempDir, Database, NegotiationService<SqliteCatalog>) {
    let dir = TempDir::new().unwrap();
    config.sqlite_url = format!("sqlite:{}?mode=rwc", dir.path().join("souk.db").display());

    let db = Database::connect(&config.sqlite_url).await.unwrap();
    db.migrate().await.unwrap();

    let service = NegotiationService::new(db.clone(), SqliteCatalog::new(db.clone()), config);
    (dir, db, service)
}

async fn seed_listing(db: &Database, id: &str, owner_id: &str) {
    let now = Utc::now();
    listing::create(
        db.pool(),
        &Listing {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            title: "vintage amp".to_string(),
            price: 900,
            status: ListingStatus::Active,
            sold_price: None,
            sold_at: None,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .unwrap();
}

fn new_offer(listing_id: &str, amount: i64) -> NewOffer {
    NewOffer {
        listing_id: listing_id.to_string(),
        amount,
        terms: OfferTerms::default(),
        message: None,
    }
}

/// Let the deadline strictly pass before acting on an instant-expiry offer.
async fn pass_deadline() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn sweep_expires_due_offers() {
    let (_dir, db, service) = setup_with(instant_expiry_config()).await;
    let mut events = service.subscribe();

    let mut ids = Vec::new();
    for i in 0..3 {
        let listing_id = format!("l{i}");
        seed_listing(&db, &listing_id, "seller").await;
        let offer = service
            .create_offer("buyer", new_offer(&listing_id, 500 + i))
            .await
            .unwrap();
        ids.push(offer.id);
    }
    pass_deadline().await;

    let sweeper = service.sweeper();
    let expired = sweeper.sweep_once().await.unwrap();
    assert_eq!(expired, 3);

    for id in &ids {
        let swept = offer::get(db.pool(), id).await.unwrap();
        assert_eq!(swept.status, OfferStatus::Expired);
        assert!(swept.expired_at.is_some());

        let thread = history::list_for_offer(db.pool(), id, 50, 0).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1].action_type, HistoryAction::Expired);
        assert_eq!(thread[1].action_by, SYSTEM_ACTOR);
        let details: serde_json::Value =
            serde_json::from_str(thread[1].action_details.as_deref().unwrap()).unwrap();
        assert_eq!(details["swept"], true);
    }

    // Three Created events, then three Expired ones.
    for _ in 0..3 {
        events.recv().await.unwrap();
    }
    for _ in 0..3 {
        match events.recv().await.unwrap() {
            OfferEvent::Expired(_) => {}
            other => panic!("expected Expired event, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn sweep_is_idempotent() {
    let (_dir, db, service) = setup_with(instant_expiry_config()).await;
    seed_listing(&db, "l1", "seller").await;
    let offer = service.create_offer("buyer", new_offer("l1", 500)).await.unwrap();
    pass_deadline().await;

    let sweeper = service.sweeper();
    assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

    // Exactly one expiration in the audit trail.
    let thread = history::list_for_offer(db.pool(), &offer.id, 50, 0).await.unwrap();
    let expirations = thread
        .iter()
        .filter(|e| e.action_type == HistoryAction::Expired)
        .count();
    assert_eq!(expirations, 1);
}

#[tokio::test]
async fn sweep_leaves_live_offers_alone() {
    let (_dir, db, service) = setup_with(NegotiationConfig::default()).await;
    seed_listing(&db, "l1", "seller").await;
    let offer = service.create_offer("buyer", new_offer("l1", 500)).await.unwrap();

    let expired = service.sweeper().sweep_once().await.unwrap();
    assert_eq!(expired, 0);

    let untouched = offer::get(db.pool(), &offer.id).await.unwrap();
    assert_eq!(untouched.status, OfferStatus::Pending);
}

#[tokio::test]
async fn sweep_works_through_a_backlog_in_batches() {
    let config = NegotiationConfig {
        sweep_batch_size: 2,
        ..instant_expiry_config()
    };
    let (_dir, db, service) = setup_with(config).await;

    for i in 0..5 {
        let listing_id = format!("l{i}");
        seed_listing(&db, &listing_id, "seller").await;
        service
            .create_offer("buyer", new_offer(&listing_id, 500))
            .await
            .unwrap();
    }
    pass_deadline().await;

    let expired = service.sweeper().sweep_once().await.unwrap();
    assert_eq!(expired, 5);
}

#[tokio::test]
async fn responding_to_an_expired_offer_expires_it_lazily() {
    let (_dir, db, service) = setup_with(instant_expiry_config()).await;
    seed_listing(&db, "l1", "seller").await;
    let offer = service.create_offer("buyer", new_offer("l1", 500)).await.unwrap();
    pass_deadline().await;

    let result = service
        .respond_to_offer("seller", &offer.id, OfferResponse::Accept, None)
        .await;
    match result {
        Err(NegotiationError::InvalidState(msg)) => assert!(msg.contains("expired")),
        other => panic!("expected InvalidState, got {other:?}"),
    }

    let lapsed = offer::get(db.pool(), &offer.id).await.unwrap();
    assert_eq!(lapsed.status, OfferStatus::Expired);
    assert!(lapsed.expired_at.is_some());

    // The listing was never sold.
    let unsold = listing::get(db.pool(), "l1").await.unwrap();
    assert_eq!(unsold.status, ListingStatus::Active);

    // A later sweep finds nothing left to do.
    assert_eq!(service.sweeper().sweep_once().await.unwrap(), 0);

    let thread = history::list_for_offer(db.pool(), &offer.id, 50, 0).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].action_type, HistoryAction::Expired);
    assert_eq!(thread[1].action_by, SYSTEM_ACTOR);
    let details: serde_json::Value =
        serde_json::from_str(thread[1].action_details.as_deref().unwrap()).unwrap();
    assert_eq!(details["swept"], false);
}

#[tokio::test]
async fn countering_an_expired_offer_expires_it_lazily() {
    let (_dir, db, service) = setup_with(instant_expiry_config()).await;
    seed_listing(&db, "l1", "seller").await;
    let offer = service.create_offer("buyer", new_offer("l1", 500)).await.unwrap();
    pass_deadline().await;

    let result = service
        .create_counter_offer(
            "seller",
            negotiation::CounterOffer {
                original_offer_id: offer.id.clone(),
                amount: 700,
                terms: OfferTerms::default(),
                message: None,
            },
        )
        .await;
    assert!(matches!(result, Err(NegotiationError::InvalidState(_))));

    let lapsed = offer::get(db.pool(), &offer.id).await.unwrap();
    assert_eq!(lapsed.status, OfferStatus::Expired);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accept_and_sweep_race_has_one_winner() {
    let (_dir, db, service) = setup_with(instant_expiry_config()).await;
    seed_listing(&db, "l1", "seller").await;
    let offer = service.create_offer("buyer", new_offer("l1", 500)).await.unwrap();
    pass_deadline().await;

    let service = Arc::new(service);
    let sweeper = service.sweeper();
    let offer_id = offer.id.clone();

    let responder = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .respond_to_offer("seller", &offer_id, OfferResponse::Accept, None)
                .await
        })
    };
    let sweep = tokio::spawn(async move { sweeper.sweep_once().await });

    let respond_result = responder.await.unwrap();
    let swept = sweep.await.unwrap().unwrap();

    // The responder always loses on an already-due offer; whichever path won
    // the conditional update, it expired exactly once.
    assert!(matches!(
        respond_result,
        Err(NegotiationError::InvalidState(_))
    ));
    assert!(swept <= 1);

    let settled = offer::get(db.pool(), &offer.id).await.unwrap();
    assert_eq!(settled.status, OfferStatus::Expired);

    let thread = history::list_for_offer(db.pool(), &offer.id, 50, 0).await.unwrap();
    let expirations = thread
        .iter()
        .filter(|e| e.action_type == HistoryAction::Expired)
        .count();
    assert_eq!(expirations, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transitions_have_one_winner() {
    let (_dir, db, service) = setup_with(NegotiationConfig::default()).await;
    seed_listing(&db, "l1", "seller").await;
    let offer = service.create_offer("buyer", new_offer("l1", 500)).await.unwrap();

    let now = Utc::now();
    let accept = {
        let db = db.clone();
        let id = offer.id.clone();
        tokio::spawn(async move { offer::transition(db.pool(), &id, OfferStatus::Accepted, now).await })
    };
    let expire = {
        let db = db.clone();
        let id = offer.id.clone();
        tokio::spawn(async move { offer::transition(db.pool(), &id, OfferStatus::Expired, now).await })
    };

    let accepted = accept.await.unwrap().unwrap();
    let expired = expire.await.unwrap().unwrap();
    assert!(accepted ^ expired, "exactly one transition must win");

    let settled = offer::get(db.pool(), &offer.id).await.unwrap();
    assert!(settled.status == OfferStatus::Accepted || settled.status == OfferStatus::Expired);
    assert!(settled.status.is_terminal());
}

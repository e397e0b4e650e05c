//! Expiration and reclamation: lapsed holds return to the pool, buyer
//! actions race the sweeper safely, and in-payment holds are protected.
//!
//! Run with: `cargo test --test expiration_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/expect

use boxoffice_core::{
    EngineConfig, ExpirationReclaimer, InMemoryReservationStore, InventoryLedger,
    PaymentOrchestrator, ReservationError, ReservationLifecycle, ReservationStatus,
    ReservationStore, environment::Clock,
    types::{BuyerDetails, EventId, TicketRequest},
};
use boxoffice_testing::{
    RecordingNotifier, ScriptedGateway,
    builders::category,
    mocks::{ManualClock, test_clock},
};
use chrono::Duration;
use std::sync::Arc;

struct Harness {
    ledger: Arc<InventoryLedger>,
    gateway: Arc<ScriptedGateway>,
    clock: Arc<ManualClock>,
    lifecycle: Arc<ReservationLifecycle>,
    reclaimer: ExpirationReclaimer,
}

fn harness() -> Harness {
    let config = EngineConfig::default();
    let ledger = Arc::new(InventoryLedger::new());
    let gateway = Arc::new(ScriptedGateway::approving());
    let clock = Arc::new(ManualClock::starting_at(test_clock().now()));
    let store: Arc<dyn ReservationStore> = Arc::new(InMemoryReservationStore::new());
    let payments = Arc::new(PaymentOrchestrator::new(
        Arc::clone(&gateway) as Arc<dyn boxoffice_core::PaymentGateway>,
        &config,
    ));
    let lifecycle = Arc::new(ReservationLifecycle::new(
        Arc::clone(&ledger),
        store,
        payments,
        Arc::new(RecordingNotifier::new()),
        Arc::clone(&clock) as Arc<dyn Clock>,
        config.clone(),
    ));
    let reclaimer = ExpirationReclaimer::new(Arc::clone(&lifecycle), &config);
    Harness {
        ledger,
        gateway,
        clock,
        lifecycle,
        reclaimer,
    }
}

fn buyer() -> BuyerDetails {
    BuyerDetails::new(
        "bob@example.com".to_string(),
        "Bob Example".to_string(),
        "2 Example Road".to_string(),
    )
}

/// A lapsed pending hold is swept back into the pool and the category is
/// immediately sellable again.
#[tokio::test]
async fn test_sweep_reclaims_lapsed_hold() {
    let h = harness();
    let event_id = EventId::new();
    let cat = category(event_id, h.clock.now(), 2, 3000);
    let cat_id = cat.id;
    h.ledger.publish_category(cat).unwrap();

    let reservation = h
        .lifecycle
        .create(
            event_id,
            &[TicketRequest::new(cat_id, 2)],
            Some(Duration::minutes(15)),
        )
        .await
        .unwrap();
    assert_eq!(h.ledger.availability(&cat_id).unwrap().available(), 0);

    // a sweep before the deadline reclaims nothing
    assert_eq!(h.reclaimer.run_once().await, 0);

    h.clock.advance(Duration::minutes(16));
    assert_eq!(h.reclaimer.run_once().await, 1);

    let expired = h.lifecycle.find_by_id(reservation.id).await.unwrap();
    assert_eq!(expired.status, ReservationStatus::Expired);
    assert_eq!(h.ledger.availability(&cat_id).unwrap().available(), 2);

    // a new buyer can take the seats the expired hold gave back
    let fresh = h
        .lifecycle
        .create(event_id, &[TicketRequest::new(cat_id, 2)], None)
        .await
        .unwrap();
    assert_eq!(fresh.status, ReservationStatus::Pending);

    // sweeping again leaves the fresh hold alone
    assert_eq!(h.reclaimer.run_once().await, 0);
}

/// An expired pending reservation refuses buyer transitions even before
/// the sweeper reaches it; the deadline is authoritative.
#[tokio::test]
async fn test_expired_hold_rejects_buyer_actions_before_sweep() {
    let h = harness();
    let event_id = EventId::new();
    let cat = category(event_id, h.clock.now(), 5, 1000);
    let cat_id = cat.id;
    h.ledger.publish_category(cat).unwrap();

    let reservation = h
        .lifecycle
        .create(event_id, &[TicketRequest::new(cat_id, 1)], None)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(30));

    // no sweep has run, but the deadline already bites
    let err = h
        .lifecycle
        .transition_to_in_payment(reservation.id, buyer())
        .await
        .unwrap_err();
    assert_eq!(err, ReservationError::ReservationExpired(reservation.id));
}

/// In-payment holds are exempt from the sweep, and a purchase that stays
/// inside the deadline completes normally.
#[tokio::test]
async fn test_in_payment_hold_survives_sweep() {
    let h = harness();
    let event_id = EventId::new();
    let cat = category(event_id, h.clock.now(), 1, 4500);
    let cat_id = cat.id;
    h.ledger.publish_category(cat).unwrap();

    let reservation = h
        .lifecycle
        .create(event_id, &[TicketRequest::new(cat_id, 1)], None)
        .await
        .unwrap();
    h.lifecycle
        .transition_to_in_payment(reservation.id, buyer())
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(20));
    assert_eq!(h.reclaimer.run_once().await, 0, "in-payment holds are exempt");

    let completed = h
        .lifecycle
        .complete_reservation(reservation.id, Some("tok_visa"))
        .await
        .unwrap();
    assert_eq!(completed.status, ReservationStatus::Complete);
    assert_eq!(h.ledger.availability(&cat_id).unwrap().confirmed, 1);
}

/// The deadline also bites from in-payment: a completion invoked after
/// the validity lapsed is rejected before any charge, even though the
/// sweep never touched the hold. Reverting frees the reservation for the
/// sweep to reclaim.
#[tokio::test]
async fn test_in_payment_completion_rejected_past_deadline() {
    let h = harness();
    let event_id = EventId::new();
    let cat = category(event_id, h.clock.now(), 1, 4500);
    let cat_id = cat.id;
    h.ledger.publish_category(cat).unwrap();

    let reservation = h
        .lifecycle
        .create(event_id, &[TicketRequest::new(cat_id, 1)], None)
        .await
        .unwrap();
    h.lifecycle
        .transition_to_in_payment(reservation.id, buyer())
        .await
        .unwrap();

    h.clock.advance(Duration::hours(2));
    assert_eq!(h.reclaimer.run_once().await, 0, "in-payment holds are exempt");

    let err = h
        .lifecycle
        .complete_reservation(reservation.id, Some("tok_visa"))
        .await
        .unwrap_err();
    assert_eq!(err, ReservationError::ReservationExpired(reservation.id));

    // still in payment with its hold intact, and the card never charged
    let stuck = h.lifecycle.find_by_id(reservation.id).await.unwrap();
    assert_eq!(stuck.status, ReservationStatus::InPayment);
    assert_eq!(h.ledger.availability(&cat_id).unwrap().pending, 1);
    assert!(h.gateway.requests().is_empty());

    // reverting hands the lapsed hold back to the sweep
    h.lifecycle.revert_to_pending(reservation.id).await.unwrap();
    assert_eq!(h.reclaimer.run_once().await, 1);
    assert_eq!(h.ledger.availability(&cat_id).unwrap().available(), 1);
}

/// Race at the deadline: the sweep and a buyer transition contend for
/// the same reservation, and exactly one side wins.
#[tokio::test]
async fn test_sweep_races_buyer_transition_one_winner() {
    println!("🧪 Expiry race: sweep vs transition at the deadline");

    for round in 0..20 {
        let h = harness();
        let event_id = EventId::new();
        let cat = category(event_id, h.clock.now(), 1, 2000);
        let cat_id = cat.id;
        h.ledger.publish_category(cat).unwrap();

        let reservation = h
            .lifecycle
            .create(event_id, &[TicketRequest::new(cat_id, 1)], None)
            .await
            .unwrap();

        // land exactly on the deadline; both sides see it as crossed
        h.clock.advance(Duration::minutes(25));

        let sweeper = {
            let lifecycle = Arc::clone(&h.lifecycle);
            let id = reservation.id;
            tokio::spawn(async move { lifecycle.expire_reservation(id).await.unwrap() })
        };
        let transition = {
            let lifecycle = Arc::clone(&h.lifecycle);
            let id = reservation.id;
            tokio::spawn(async move { lifecycle.transition_to_in_payment(id, buyer()).await })
        };

        let swept = sweeper.await.unwrap();
        let transitioned = transition.await.unwrap();

        // the deadline is inclusive, so whichever side runs first the
        // buyer must lose and the sweep must reclaim
        assert!(swept, "round {round}: sweep found nothing to reclaim");
        assert!(transitioned.is_err(), "round {round}: buyer beat the deadline");
        let final_state = h.lifecycle.find_by_id(reservation.id).await.unwrap();
        match final_state.status {
            ReservationStatus::Expired => {
                assert_eq!(h.ledger.availability(&cat_id).unwrap().available(), 1);
            }
            other => panic!("round {round}: unexpected status {other}"),
        }
    }
}

/// The background loop sweeps on its own and shuts down cleanly.
#[tokio::test]
async fn test_background_reclaimer_loop() {
    let config = EngineConfig {
        reclaim_interval: std::time::Duration::from_millis(20),
        ..EngineConfig::default()
    };
    let ledger = Arc::new(InventoryLedger::new());
    let clock = Arc::new(ManualClock::starting_at(test_clock().now()));
    let store: Arc<dyn ReservationStore> = Arc::new(InMemoryReservationStore::new());
    let payments = Arc::new(PaymentOrchestrator::new(
        Arc::new(ScriptedGateway::approving()),
        &config,
    ));
    let lifecycle = Arc::new(ReservationLifecycle::new(
        Arc::clone(&ledger),
        store,
        payments,
        Arc::new(RecordingNotifier::new()),
        Arc::clone(&clock) as Arc<dyn Clock>,
        config.clone(),
    ));

    let event_id = EventId::new();
    let cat = category(event_id, clock.now(), 1, 1000);
    let cat_id = cat.id;
    ledger.publish_category(cat).unwrap();

    let reservation = lifecycle
        .create(event_id, &[TicketRequest::new(cat_id, 1)], None)
        .await
        .unwrap();
    clock.advance(Duration::minutes(26));

    let handle = ExpirationReclaimer::new(Arc::clone(&lifecycle), &config).spawn();

    // wait for the loop to pick it up
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        let status = lifecycle.find_by_id(reservation.id).await.unwrap().status;
        if status == ReservationStatus::Expired {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "reclaimer never swept the lapsed hold"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    handle.shutdown().await;
    assert_eq!(ledger.availability(&cat_id).unwrap().available(), 1);
}

//! Booking walkthrough.
//!
//! Publishes two ticket categories, drives a reservation through the full
//! lifecycle against the mock gateway, abandons a second one and lets the
//! reclaimer sweep it back.
//!
//! Run with: `cargo run -p booking-demo`

use boxoffice_core::{
    EngineConfig, ExpirationReclaimer, InMemoryReservationStore, InventoryLedger, NoopNotifier,
    MockPaymentGateway, PaymentOrchestrator, ReservationLifecycle,
    environment::{Clock, SystemClock},
    types::{BuyerDetails, Capacity, CategoryId, EventId, Money, SaleWindow, TicketCategory,
        TicketRequest},
};
use chrono::Duration;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking_demo=info,boxoffice_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting booking walkthrough");

    let config = EngineConfig::from_env();
    info!(
        max_tickets = config.max_tickets_per_reservation,
        hold_minutes = config.hold_minutes,
        currency = %config.currency,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(InventoryLedger::new());
    let store = Arc::new(InMemoryReservationStore::new());
    let payments = Arc::new(PaymentOrchestrator::new(
        Arc::new(MockPaymentGateway::new()),
        &config,
    ));
    let lifecycle = Arc::new(ReservationLifecycle::new(
        Arc::clone(&ledger),
        store,
        payments,
        Arc::new(NoopNotifier),
        Arc::clone(&clock),
        config.clone(),
    ));
    let reclaimer = ExpirationReclaimer::new(Arc::clone(&lifecycle), &config);

    // Publish an event with two categories
    let event_id = EventId::new();
    let now = clock.now();
    let early_bird = TicketCategory::new(
        CategoryId::new(),
        event_id,
        "Early Bird".to_string(),
        Capacity::new(50),
        Money::from_cents(4500),
        SaleWindow::new(now - Duration::hours(1), now + Duration::days(60), "Europe/Rome".to_string()),
        false,
    );
    let regular = TicketCategory::new(
        CategoryId::new(),
        event_id,
        "Regular".to_string(),
        Capacity::new(200),
        Money::from_cents(7000),
        SaleWindow::new(now - Duration::hours(1), now + Duration::days(60), "Europe/Rome".to_string()),
        false,
    );
    let (early_id, regular_id) = (early_bird.id, regular.id);
    ledger.publish_category(early_bird)?;
    ledger.publish_category(regular)?;
    info!(event = %event_id, "Categories published");

    // A buyer takes two early birds and one regular, pays, and is done
    let reservation = lifecycle
        .create(
            event_id,
            &[
                TicketRequest::new(early_id, 2),
                TicketRequest::new(regular_id, 1),
            ],
            None,
        )
        .await?;
    info!(reservation = %reservation.id, total = %reservation.total_cost(), "Hold placed");

    for row in lifecycle.summary(reservation.id).await? {
        info!(
            category = %row.category_name,
            quantity = row.quantity,
            unit = %row.unit_price,
            subtotal = %row.subtotal,
            "Summary row"
        );
    }

    let buyer = BuyerDetails::new(
        "dana@example.com".to_string(),
        "Dana Example".to_string(),
        "4 Demo Square".to_string(),
    );
    lifecycle.transition_to_in_payment(reservation.id, buyer).await?;
    let completed = lifecycle
        .complete_reservation(reservation.id, Some("tok_demo_visa"))
        .await?;
    info!(
        reservation = %completed.id,
        status = %completed.status,
        tickets = completed.tickets.len(),
        "Purchase complete"
    );

    // A second buyer holds tickets with a short validity and walks away
    let abandoned = lifecycle
        .create(
            event_id,
            &[TicketRequest::new(regular_id, 2)],
            Some(Duration::seconds(1)),
        )
        .await?;
    info!(reservation = %abandoned.id, "Second hold placed, buyer walks away");

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    let reclaimed = reclaimer.run_once().await;
    info!(reclaimed, "Sweep finished");

    let availability = ledger.availability(&regular_id)?;
    info!(
        total = availability.total,
        confirmed = availability.confirmed,
        pending = availability.pending,
        available = availability.available(),
        "Regular category after the dust settles"
    );

    Ok(())
}

//! Reservation lifecycle engine.
//!
//! Owns every transition of the reservation state machine:
//!
//! ```text
//! Pending ──► InPayment ──► Complete
//!   │  ▲          │
//!   │  └──────────┘ (revert)
//!   ├──► Cancelled
//!   └──► Expired
//! ```
//!
//! All writes to a reservation go through a per-reservation async mutex,
//! so transitions observe a consistent snapshot; the store's optimistic
//! version check backs that up. The ledger is always updated before the
//! store on the release side, so a crash between the two can only leave
//! capacity temporarily over-released, never oversold.

use crate::config::EngineConfig;
use crate::environment::Clock;
use crate::errors::ReservationError;
use crate::inventory::InventoryLedger;
use crate::notify::{self, Notifier, TemplateKind};
use crate::payment::PaymentOrchestrator;
use crate::store::ReservationStore;
use crate::types::{
    BuyerDetails, EventId, LineItem, LineItems, Reservation, ReservationExpiry, ReservationId,
    ReservationStatus, SummaryRow, Ticket, TicketRequest,
};
use crate::validation::{validate_buyer, validate_payment_form, validate_reservation_request};
use chrono::Duration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of per-reservation async mutexes.
///
/// Serializes writers on the same reservation; entries are pruned when
/// the reservation reaches a terminal state.
#[derive(Debug, Default)]
pub struct ReservationLocks {
    inner: Mutex<HashMap<ReservationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReservationLocks {
    /// Returns the mutex for a reservation, creating it on first use
    #[must_use]
    pub fn lock_for(&self, id: ReservationId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.inner
                .lock()
                .entry(id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    fn prune(&self, id: &ReservationId) {
        self.inner.lock().remove(id);
    }
}

/// Drives reservations through their lifecycle.
///
/// The only component allowed to mutate stored reservations.
pub struct ReservationLifecycle {
    ledger: Arc<InventoryLedger>,
    store: Arc<dyn ReservationStore>,
    payments: Arc<PaymentOrchestrator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    locks: ReservationLocks,
}

impl ReservationLifecycle {
    /// Wires the engine over its collaborators
    #[must_use]
    pub fn new(
        ledger: Arc<InventoryLedger>,
        store: Arc<dyn ReservationStore>,
        payments: Arc<PaymentOrchestrator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            payments,
            notifier,
            clock,
            config,
            locks: ReservationLocks::default(),
        }
    }

    /// Maximum tickets a single reservation may hold
    #[must_use]
    pub const fn max_amount_of_tickets(&self) -> u32 {
        self.config.max_tickets_per_reservation
    }

    /// Creates a reservation: validates the request, atomically allocates
    /// every line from the ledger, captures unit prices onto tickets and
    /// persists the result as `Pending`.
    ///
    /// `validity` overrides the configured hold duration when given.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Validation`] for a malformed request,
    /// [`ReservationError::NotEnoughTickets`] when any line cannot be
    /// satisfied (in which case nothing is allocated or persisted), or a
    /// store error.
    pub async fn create(
        &self,
        event_id: EventId,
        requests: &[TicketRequest],
        validity: Option<Duration>,
    ) -> Result<Reservation, ReservationError> {
        let now = self.clock.now();
        let errors = validate_reservation_request(
            requests,
            self.config.max_tickets_per_reservation,
            now,
            |id| self.ledger.category(id),
        );
        if !errors.is_empty() {
            return Err(ReservationError::Validation(errors));
        }

        let lines: Vec<_> = requests
            .iter()
            .filter(|r| r.quantity > 0)
            .map(|r| (r.category_id, r.quantity))
            .collect();
        let allocation = self
            .ledger
            .allocate_many(&lines)
            .map_err(ReservationError::from_allocation)?;

        // Token lines are coalesced and sorted; capture prices from them.
        let mut line_items = LineItems::new();
        let mut tickets = Vec::new();
        for &(category_id, quantity) in allocation.lines() {
            // published a moment ago under the allocation, still present
            let unit_price = self
                .ledger
                .category(&category_id)
                .map(|c| c.price)
                .unwrap_or_default();
            line_items.push(LineItem {
                category_id,
                quantity,
                unit_price,
            });
            for _ in 0..quantity {
                tickets.push(Ticket::new(category_id, unit_price));
            }
        }

        let hold = validity.unwrap_or_else(|| Duration::minutes(self.config.hold_minutes));
        let reservation = Reservation {
            id: ReservationId::new(),
            event_id,
            line_items,
            tickets,
            status: ReservationStatus::Pending,
            validity: ReservationExpiry::new(now + hold),
            buyer: None,
            allocation: allocation.clone(),
            created_at: now,
        };

        if let Err(err) = self.store.insert(reservation.clone()).await {
            // compensate: never strand held capacity
            self.ledger.release(&allocation);
            return Err(err.into());
        }

        metrics::counter!("reservations.created").increment(1);
        tracing::info!(
            reservation = %reservation.id,
            event = %event_id,
            tickets = reservation.tickets.len(),
            expires = %reservation.validity,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Buyer-initiated cancellation of a `Pending` reservation. Releases
    /// the hold and marks the reservation `Cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::InvalidState`] unless the reservation
    /// is `Pending`.
    pub async fn cancel_pending_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;

        let stored = self.store.get(&id).await.map_err(Self::map_missing)?;
        let mut reservation = stored.reservation;
        if reservation.status != ReservationStatus::Pending {
            return Err(ReservationError::InvalidState {
                id,
                expected: ReservationStatus::Pending,
                actual: reservation.status,
            });
        }

        self.ledger.release(&reservation.allocation);
        reservation.status = ReservationStatus::Cancelled;
        self.store.update(reservation.clone(), stored.version).await?;
        self.locks.prune(&id);

        metrics::counter!("reservations.cancelled").increment(1);
        tracing::info!(reservation = %id, "reservation cancelled");
        Ok(reservation)
    }

    /// Moves a live `Pending` reservation into `InPayment`, attaching
    /// validated buyer details.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::ReservationExpired`] if the hold has
    /// lapsed, [`ReservationError::Validation`] for bad buyer details, or
    /// [`ReservationError::InvalidState`] from any other status.
    pub async fn transition_to_in_payment(
        &self,
        id: ReservationId,
        buyer: BuyerDetails,
    ) -> Result<Reservation, ReservationError> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;

        let stored = self.store.get(&id).await.map_err(Self::map_missing)?;
        let mut reservation = stored.reservation;
        if reservation.status != ReservationStatus::Pending {
            return Err(ReservationError::InvalidState {
                id,
                expected: ReservationStatus::Pending,
                actual: reservation.status,
            });
        }
        if reservation.validity.is_expired(self.clock.now()) {
            return Err(ReservationError::ReservationExpired(id));
        }

        let errors = validate_buyer(&buyer);
        if !errors.is_empty() {
            return Err(ReservationError::Validation(errors));
        }

        reservation.buyer = Some(buyer);
        reservation.status = ReservationStatus::InPayment;
        self.store.update(reservation.clone(), stored.version).await?;

        tracing::info!(reservation = %id, "reservation moved to payment");
        Ok(reservation)
    }

    /// Returns an `InPayment` reservation to `Pending`, used when the
    /// buyer backs out of the payment step or after a definite decline.
    ///
    /// Refused while the last charge attempt is still ambiguous: the only
    /// permitted follow-up there is a same-key retry.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::InvalidState`] unless the reservation
    /// is `InPayment` with a settled charge outcome.
    pub async fn revert_to_pending(
        &self,
        id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;

        let stored = self.store.get(&id).await.map_err(Self::map_missing)?;
        let mut reservation = stored.reservation;
        if reservation.status != ReservationStatus::InPayment || self.payments.is_uncertain(&id) {
            return Err(ReservationError::InvalidState {
                id,
                expected: ReservationStatus::InPayment,
                actual: reservation.status,
            });
        }

        reservation.status = ReservationStatus::Pending;
        self.store.update(reservation.clone(), stored.version).await?;

        tracing::info!(reservation = %id, "reservation reverted to pending");
        Ok(reservation)
    }

    /// Completes a reservation: charges the captured total, confirms the
    /// inventory hold and notifies the buyer.
    ///
    /// Zero-cost reservations complete directly from `Pending` without a
    /// card token; everything else must be `InPayment`. A lapsed validity
    /// deadline fails the completion even though in-payment holds are
    /// exempt from the sweep, with one exception: a retry of a charge
    /// whose last outcome is still ambiguous is allowed through, because
    /// the money may already be captured and the same-key retry is the
    /// only way to settle it. If the charge captures but the hold turns
    /// out to have been released, the charge is refunded and the
    /// completion fails.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Payment`] on decline or gateway
    /// ambiguity (retry with the same reservation id),
    /// [`ReservationError::ReservationExpired`] past the deadline, or
    /// [`ReservationError::InvalidState`] as for the other transitions.
    pub async fn complete_reservation(
        &self,
        id: ReservationId,
        card_token: Option<&str>,
    ) -> Result<Reservation, ReservationError> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;

        let stored = self.store.get(&id).await.map_err(Self::map_missing)?;
        let mut reservation = stored.reservation;
        let cost = reservation.total_cost();

        match reservation.status {
            ReservationStatus::InPayment => {
                if reservation.validity.is_expired(self.clock.now())
                    && !self.payments.is_uncertain(&id)
                {
                    return Err(ReservationError::ReservationExpired(id));
                }
            }
            ReservationStatus::Pending if cost.is_zero() => {
                if reservation.validity.is_expired(self.clock.now()) {
                    return Err(ReservationError::ReservationExpired(id));
                }
            }
            other => {
                return Err(ReservationError::InvalidState {
                    id,
                    expected: ReservationStatus::InPayment,
                    actual: other,
                });
            }
        }

        let receipt = if cost.is_zero() {
            None
        } else {
            if let Some(buyer) = &reservation.buyer {
                let errors = validate_payment_form(buyer, cost, card_token);
                if !errors.is_empty() {
                    return Err(ReservationError::Validation(errors));
                }
            }
            let token = card_token.unwrap_or_default();
            Some(self.payments.charge(id, cost, token).await?)
        };

        if let Err(err) = self.ledger.confirm(&reservation.allocation) {
            // the hold was reclaimed under us; give the money back
            if let Some(receipt) = &receipt {
                if let Err(refund_err) = self.payments.refund(receipt).await {
                    tracing::error!(
                        reservation = %id,
                        error = %refund_err,
                        "compensating refund failed, manual follow-up required"
                    );
                }
            }
            return Err(err.into());
        }

        reservation.status = ReservationStatus::Complete;
        self.store.update(reservation.clone(), stored.version).await?;
        self.locks.prune(&id);

        metrics::counter!("reservations.completed").increment(1);
        tracing::info!(reservation = %id, total = %cost, "reservation completed");

        if let Err(error) = self
            .notifier
            .notify(TemplateKind::ReservationComplete, &reservation)
            .await
        {
            notify::log_delivery_failure(id, &error);
        }

        Ok(reservation)
    }

    /// Expires a `Pending` reservation whose deadline has passed,
    /// releasing its hold. Called by the reclaimer; skips silently when
    /// the reservation moved on or the deadline has not arrived.
    ///
    /// # Errors
    ///
    /// Returns store errors only; a missing or non-expirable reservation
    /// is not an error.
    pub async fn expire_reservation(&self, id: ReservationId) -> Result<bool, ReservationError> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;

        let Ok(stored) = self.store.get(&id).await else {
            return Ok(false);
        };
        let mut reservation = stored.reservation;
        if reservation.status != ReservationStatus::Pending
            || !reservation.validity.is_expired(self.clock.now())
        {
            return Ok(false);
        }

        self.ledger.release(&reservation.allocation);
        reservation.status = ReservationStatus::Expired;
        self.store.update(reservation.clone(), stored.version).await?;
        self.locks.prune(&id);

        metrics::counter!("reservations.expired").increment(1);
        tracing::info!(reservation = %id, "reservation expired and hold reclaimed");
        Ok(true)
    }

    /// Fetches a reservation by id.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`] for an unknown id.
    pub async fn find_by_id(&self, id: ReservationId) -> Result<Reservation, ReservationError> {
        Ok(self
            .store
            .get(&id)
            .await
            .map_err(Self::map_missing)?
            .reservation)
    }

    /// Total cost of a reservation, from the prices captured on its
    /// tickets.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`] for an unknown id.
    pub async fn total_cost(&self, id: ReservationId) -> Result<crate::types::Money, ReservationError> {
        Ok(self.find_by_id(id).await?.total_cost())
    }

    /// Display summary: one row per category with captured unit price,
    /// quantity and subtotal.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`] for an unknown id.
    pub async fn summary(&self, id: ReservationId) -> Result<Vec<SummaryRow>, ReservationError> {
        let reservation = self.find_by_id(id).await?;
        Ok(reservation
            .line_items
            .iter()
            .map(|line| SummaryRow {
                category_name: self
                    .ledger
                    .category(&line.category_id)
                    .map(|c| c.name)
                    .unwrap_or_default(),
                unit_price: line.unit_price,
                quantity: line.quantity,
                subtotal: line.unit_price.saturating_multiply(line.quantity),
            })
            .collect())
    }

    /// Store handle, used by the reclaimer to find expired holds
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    /// Clock handle shared with the reclaimer
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn map_missing(err: crate::errors::StoreError) -> ReservationError {
        match err {
            crate::errors::StoreError::NotFound(id) => ReservationError::NotFound(id),
            other => ReservationError::Store(other),
        }
    }
}

//! Reservation persistence boundary.
//!
//! The store holds reservations and enforces optimistic concurrency:
//! every successful update bumps a version counter, and an update carrying
//! a stale version is rejected with [`StoreError::VersionConflict`]. The
//! lifecycle engine serializes writers per reservation above this layer;
//! the version check is the backstop underneath it.

use crate::errors::StoreError;
use crate::types::{Reservation, ReservationId, ReservationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A reservation together with its store version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedReservation {
    /// The stored reservation
    pub reservation: Reservation,
    /// Version to present on the next update
    pub version: u64,
}

/// Storage abstraction for reservations.
///
/// Implementations must make each method atomic with respect to the
/// others for the same reservation id.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Inserts a new reservation at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateReservation`] if the id exists.
    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError>;

    /// Fetches a reservation and its current version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    async fn get(&self, id: &ReservationId) -> Result<VersionedReservation, StoreError>;

    /// Replaces a reservation if `expected_version` still matches,
    /// returning the new version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id, or
    /// [`StoreError::VersionConflict`] if another writer got there first.
    async fn update(
        &self,
        reservation: Reservation,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Ids of `Pending` reservations whose validity deadline has passed.
    ///
    /// `InPayment` reservations are never returned: a charge may be in
    /// flight and only an explicit abandon decision may touch them.
    async fn expired_pending(&self, now: DateTime<Utc>) -> Vec<ReservationId>;

    /// Ids of reservations currently in the given status
    async fn ids_with_status(&self, status: ReservationStatus) -> Vec<ReservationId>;
}

/// In-memory store backed by a single mutex-guarded map.
///
/// Suitable for a single-process deployment and for tests.
#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    inner: Mutex<HashMap<ReservationId, VersionedReservation>>,
}

impl InMemoryReservationStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reservations
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.contains_key(&reservation.id) {
            return Err(StoreError::DuplicateReservation(reservation.id));
        }
        inner.insert(
            reservation.id,
            VersionedReservation {
                reservation,
                version: 1,
            },
        );
        Ok(())
    }

    async fn get(&self, id: &ReservationId) -> Result<VersionedReservation, StoreError> {
        self.inner
            .lock()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    async fn update(
        &self,
        reservation: Reservation,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .get_mut(&reservation.id)
            .ok_or(StoreError::NotFound(reservation.id))?;
        if entry.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: reservation.id,
                expected: expected_version,
                actual: entry.version,
            });
        }
        entry.version += 1;
        entry.reservation = reservation;
        Ok(entry.version)
    }

    async fn expired_pending(&self, now: DateTime<Utc>) -> Vec<ReservationId> {
        self.inner
            .lock()
            .values()
            .filter(|v| {
                v.reservation.status == ReservationStatus::Pending
                    && v.reservation.validity.is_expired(now)
            })
            .map(|v| v.reservation.id)
            .collect()
    }

    async fn ids_with_status(&self, status: ReservationStatus) -> Vec<ReservationId> {
        self.inner
            .lock()
            .values()
            .filter(|v| v.reservation.status == status)
            .map(|v| v.reservation.id)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::inventory::InventoryLedger;
    use crate::types::{
        Capacity, CategoryId, EventId, LineItem, Money, ReservationExpiry, SaleWindow, Ticket,
        TicketCategory,
    };
    use chrono::Duration;
    use smallvec::smallvec;

    fn sample_reservation(status: ReservationStatus, validity: DateTime<Utc>) -> Reservation {
        let ledger = InventoryLedger::new();
        let category = CategoryId::new();
        let now = Utc::now();
        ledger
            .publish_category(TicketCategory::new(
                category,
                EventId::new(),
                "General".to_string(),
                Capacity::new(10),
                Money::from_cents(1500),
                SaleWindow::new(now - Duration::hours(1), now + Duration::hours(1), "UTC".to_string()),
                false,
            ))
            .unwrap();
        let allocation = ledger.allocate(category, 1).unwrap();
        Reservation {
            id: ReservationId::new(),
            event_id: EventId::new(),
            line_items: smallvec![LineItem {
                category_id: category,
                quantity: 1,
                unit_price: Money::from_cents(1500),
            }],
            tickets: vec![Ticket::new(category, Money::from_cents(1500))],
            status,
            validity: ReservationExpiry::new(validity),
            buyer: None,
            allocation,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = InMemoryReservationStore::new();
        let reservation = sample_reservation(ReservationStatus::Pending, Utc::now());
        let id = reservation.id;

        store.insert(reservation.clone()).await.unwrap();
        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.reservation, reservation);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemoryReservationStore::new();
        let reservation = sample_reservation(ReservationStatus::Pending, Utc::now());
        let id = reservation.id;

        store.insert(reservation.clone()).await.unwrap();
        assert_eq!(
            store.insert(reservation).await.unwrap_err(),
            StoreError::DuplicateReservation(id)
        );
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryReservationStore::new();
        let mut reservation = sample_reservation(ReservationStatus::Pending, Utc::now());
        store.insert(reservation.clone()).await.unwrap();

        reservation.status = ReservationStatus::InPayment;
        let v2 = store.update(reservation.clone(), 1).await.unwrap();
        assert_eq!(v2, 2);

        // a writer still holding version 1 must lose
        reservation.status = ReservationStatus::Cancelled;
        let err = store.update(reservation.clone(), 1).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                id: reservation.id,
                expected: 1,
                actual: 2
            }
        );
    }

    #[tokio::test]
    async fn test_expired_pending_excludes_in_payment() {
        let store = InMemoryReservationStore::new();
        let now = Utc::now();
        let past = now - Duration::minutes(1);

        let pending_dead = sample_reservation(ReservationStatus::Pending, past);
        let pending_live =
            sample_reservation(ReservationStatus::Pending, now + Duration::minutes(25));
        let in_payment_dead = sample_reservation(ReservationStatus::InPayment, past);

        store.insert(pending_dead.clone()).await.unwrap();
        store.insert(pending_live).await.unwrap();
        store.insert(in_payment_dead).await.unwrap();

        let expired = store.expired_pending(now).await;
        assert_eq!(expired, vec![pending_dead.id]);
    }
}

//! Outbound notification boundary.
//!
//! The lifecycle engine fires notifications after state changes commit;
//! delivery failures are logged, never propagated, and never roll back a
//! transition.

use crate::types::{Reservation, ReservationId};
use async_trait::async_trait;

/// Kinds of buyer-facing messages the engine can emit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Confirmation sent when a reservation reaches `Complete`
    ReservationComplete,
}

/// Delivery channel for buyer notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a templated message about a reservation.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the delivery failure.
    async fn notify(&self, template: TemplateKind, reservation: &Reservation)
    -> Result<(), String>;
}

/// Notifier that drops every message, for deployments without a mail
/// channel and for tests that don't assert on notifications
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(
        &self,
        _template: TemplateKind,
        _reservation: &Reservation,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Logs a delivery failure without affecting the caller
pub(crate) fn log_delivery_failure(id: ReservationId, error: &str) {
    metrics::counter!("notify.failures").increment(1);
    tracing::warn!(reservation = %id, error, "notification delivery failed");
}

//! # Boxoffice Core
//!
//! Reservation and inventory allocation engine for ticketed events.
//!
//! The engine guards one promise: a ticket category is never oversold,
//! under any interleaving of buyers, cancellations, expirations and
//! payments. Around that promise it provides:
//!
//! - **Inventory ledger**: per-category counters with atomic, all-or-nothing
//!   multi-category allocation ([`inventory`])
//! - **Reservation lifecycle**: the `Pending → InPayment → Complete`
//!   state machine with cancellation, expiry and revert ([`lifecycle`])
//! - **Expiration reclaimer**: background sweeps that return lapsed holds
//!   to the pool ([`reclaimer`])
//! - **Payment orchestration**: timeout-bounded charges with deterministic
//!   idempotency keys and compensating refunds ([`payment`])
//!
//! External dependencies (time, payments, persistence, notification) are
//! injected via traits, so the whole engine can run deterministically
//! under test.

pub mod config;
pub mod errors;
pub mod inventory;
pub mod lifecycle;
pub mod notify;
pub mod payment;
pub mod reclaimer;
pub mod store;
pub mod types;
pub mod validation;

pub use config::EngineConfig;
pub use errors::{LedgerError, PaymentError, ReservationError, StoreError};
pub use inventory::{AllocationToken, CategoryAvailability, InventoryLedger};
pub use lifecycle::{ReservationLifecycle, ReservationLocks};
pub use notify::{NoopNotifier, Notifier, TemplateKind};
pub use payment::{
    ChargeReceipt, ChargeRequest, GatewayError, MockPaymentGateway, PaymentGateway,
    PaymentOrchestrator,
};
pub use reclaimer::{ExpirationReclaimer, ReclaimerHandle};
pub use store::{InMemoryReservationStore, ReservationStore, VersionedReservation};
pub use types::{
    BuyerDetails, Capacity, CategoryId, EventId, LineItem, LineItems, Money, Reservation,
    ReservationExpiry, ReservationId, ReservationStatus, SaleWindow, SummaryRow, Ticket,
    TicketCategory, TicketId, TicketRequest,
};
pub use validation::{FieldError, ValidationCode};

/// Environment module - dependency injection traits
///
/// External effects are abstracted behind traits and injected into the
/// engine, keeping the state machine deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the operating system
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

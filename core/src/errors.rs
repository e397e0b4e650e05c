//! Error taxonomy for the reservation engine.
//!
//! Every failure is a typed, recoverable outcome returned to the caller;
//! nothing in the core terminates the process. Allocation denials carry the
//! category and the observed availability so callers can re-present
//! availability; payment ambiguity is modeled distinctly from a decline.

use crate::types::{CategoryId, ReservationId, ReservationStatus};
use crate::validation::FieldError;
use thiserror::Error;

/// Errors from the inventory ledger
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Allocation denied; no counter was mutated
    #[error("insufficient capacity in category {category}: requested {requested}, available {available}")]
    InsufficientCapacity {
        /// Category that lacked capacity
        category: CategoryId,
        /// Requested quantity
        requested: u32,
        /// Availability observed at denial time
        available: u32,
    },

    /// Category is not published in the ledger
    #[error("unknown category {0}")]
    UnknownCategory(CategoryId),

    /// A category was published twice
    #[error("category {0} is already published")]
    CategoryAlreadyPublished(CategoryId),

    /// Capacity adjustment would shrink below what is already allocated
    #[error("cannot shrink category {category} to {requested}: {allocated} already allocated")]
    CapacityBelowAllocation {
        /// Category being adjusted
        category: CategoryId,
        /// Requested new total
        requested: u32,
        /// Currently allocated (pending + confirmed)
        allocated: u32,
    },

    /// Token is not in a confirmable state
    #[error("allocation token was already released")]
    TokenReleased,
}

/// Errors from the reservation store
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Unknown reservation identifier
    #[error("reservation {0} not found")]
    NotFound(ReservationId),

    /// Optimistic version check failed: another transition won the race
    #[error("version conflict on reservation {id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Reservation whose save was rejected
        id: ReservationId,
        /// Version the caller read
        expected: u64,
        /// Version currently persisted
        actual: u64,
    },

    /// Insert of an identifier that already exists
    #[error("reservation {0} already exists")]
    DuplicateReservation(ReservationId),
}

/// Errors from the payment orchestrator
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    /// The gateway gave a definite decline; the buyer may retry with
    /// different payment details
    #[error("payment declined: {reason}")]
    Declined {
        /// Gateway-provided decline reason
        reason: String,
    },

    /// Timeout or transport failure: the charge may or may not have gone
    /// through. Only an idempotency-keyed retry is permitted.
    #[error("payment gateway unavailable: {message}")]
    GatewayUnavailable {
        /// Description of the failure
        message: String,
    },
}

/// Errors surfaced by the reservation lifecycle engine
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReservationError {
    /// Atomic allocation failed; nothing was persisted
    #[error("not enough tickets in category {category}: requested {requested}, available {available}")]
    NotEnoughTickets {
        /// Category that lacked capacity
        category: CategoryId,
        /// Requested quantity
        requested: u32,
        /// Availability observed at denial time
        available: u32,
    },

    /// Operation attempted from a state that forbids it
    #[error("reservation {id} is {actual}, operation requires {expected}")]
    InvalidState {
        /// Reservation in the wrong state
        id: ReservationId,
        /// State the operation requires
        expected: ReservationStatus,
        /// State actually observed
        actual: ReservationStatus,
    },

    /// Hold deadline has passed; the caller must restart selection
    #[error("reservation {0} has expired")]
    ReservationExpired(ReservationId),

    /// Unknown reservation identifier
    #[error("reservation {0} not found")]
    NotFound(ReservationId),

    /// Request rejected with field-level validation errors
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    /// Charge attempt failed
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Ledger operation failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ReservationError {
    /// Maps a ledger denial into the lifecycle-level `NotEnoughTickets`,
    /// passing other ledger errors through unchanged
    #[must_use]
    pub fn from_allocation(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCapacity {
                category,
                requested,
                available,
            } => Self::NotEnoughTickets {
                category,
                requested,
                available,
            },
            other => Self::Ledger(other),
        }
    }
}

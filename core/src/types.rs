//! Domain types for the reservation engine.
//!
//! Value objects and entities: identifiers, cents-based money, ticket
//! categories with sale windows, reservations with line items and captured
//! ticket prices, and the read-only summary projection handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket category.
///
/// Ordered so that multi-category allocations can acquire per-category
/// locks in one global order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(Uuid);

impl CategoryId {
    /// Creates a new random `CategoryId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `CategoryId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CategoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a single sold ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// The zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two money amounts, saturating at `u64::MAX` cents
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity, saturating at `u64::MAX` cents
    #[must_use]
    pub const fn saturating_multiply(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Capacity and Time Value Objects
// ============================================================================

/// Sellable capacity of a ticket category
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capacity(pub u32);

impl Capacity {
    /// Creates a new `Capacity`
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the capacity value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validity deadline of a reservation hold.
///
/// The deadline check is authoritative: a hold past its deadline is dead
/// whether or not the reclaimer has swept it yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationExpiry(DateTime<Utc>);

impl ReservationExpiry {
    /// Creates a new `ReservationExpiry`
    #[must_use]
    pub const fn new(deadline: DateTime<Utc>) -> Self {
        Self(deadline)
    }

    /// Returns the inner `DateTime`
    #[must_use]
    pub const fn inner(&self) -> DateTime<Utc> {
        self.0
    }

    /// Checks if the deadline has passed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.0
    }
}

impl fmt::Display for ReservationExpiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Sale window of a ticket category.
///
/// Instants are UTC; `timezone` is the event's named zone, carried for
/// display only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleWindow {
    /// When sales open
    pub opens_at: DateTime<Utc>,
    /// When sales close
    pub closes_at: DateTime<Utc>,
    /// Event timezone name (e.g. "Europe/Rome")
    pub timezone: String,
}

impl SaleWindow {
    /// Creates a new `SaleWindow`
    #[must_use]
    pub const fn new(opens_at: DateTime<Utc>, closes_at: DateTime<Utc>, timezone: String) -> Self {
        Self {
            opens_at,
            closes_at,
            timezone,
        }
    }

    /// Checks whether the category is on sale at the given instant
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        now >= self.opens_at && now < self.closes_at
    }
}

// ============================================================================
// Domain Entities
// ============================================================================

/// A class of tickets with its own price and capacity within an event.
///
/// Immutable once published, except capacity adjustments performed through
/// the inventory ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCategory {
    /// Unique category identifier
    pub id: CategoryId,
    /// Event this category belongs to
    pub event_id: EventId,
    /// Category name (e.g. "Early Bird", "VIP")
    pub name: String,
    /// Total sellable capacity
    pub capacity: Capacity,
    /// Unit price, captured onto tickets at allocation time
    pub price: Money,
    /// When this category is on sale
    pub sale_window: SaleWindow,
    /// Whether access is restricted (invitation-only)
    pub access_restricted: bool,
}

impl TicketCategory {
    /// Creates a new `TicketCategory`
    #[must_use]
    pub const fn new(
        id: CategoryId,
        event_id: EventId,
        name: String,
        capacity: Capacity,
        price: Money,
        sale_window: SaleWindow,
        access_restricted: bool,
    ) -> Self {
        Self {
            id,
            event_id,
            name,
            capacity,
            price,
            sale_window,
            access_restricted,
        }
    }
}

/// A requested (category, quantity) pair in a reservation attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRequest {
    /// Requested category
    pub category_id: CategoryId,
    /// Requested quantity
    pub quantity: u32,
}

impl TicketRequest {
    /// Creates a new `TicketRequest`
    #[must_use]
    pub const fn new(category_id: CategoryId, quantity: u32) -> Self {
        Self {
            category_id,
            quantity,
        }
    }
}

/// A committed reservation line: category, quantity and the unit price
/// captured when the allocation succeeded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Category the line refers to
    pub category_id: CategoryId,
    /// Number of tickets
    pub quantity: u32,
    /// Unit price snapshot at allocation time
    pub unit_price: Money,
}

/// One unit of sold inventory.
///
/// The paid price is a snapshot taken at allocation time and never changes,
/// regardless of later category price changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub id: TicketId,
    /// Category this ticket belongs to
    pub category_id: CategoryId,
    /// Price paid, in cents, captured at allocation
    pub paid_price: Money,
    /// Whether a holder identity has been attached (done by the caller,
    /// after completion)
    pub assigned: bool,
}

impl Ticket {
    /// Creates a new unassigned `Ticket`
    #[must_use]
    pub fn new(category_id: CategoryId, paid_price: Money) -> Self {
        Self {
            id: TicketId::new(),
            category_id,
            paid_price,
            assigned: false,
        }
    }
}

/// Buyer contact fields, populated from `InPayment` onward
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerDetails {
    /// Contact email
    pub email: String,
    /// Full name
    pub full_name: String,
    /// Billing address
    pub billing_address: String,
}

impl BuyerDetails {
    /// Creates new `BuyerDetails`
    #[must_use]
    pub const fn new(email: String, full_name: String, billing_address: String) -> Self {
        Self {
            email,
            full_name,
            billing_address,
        }
    }
}

/// Reservation lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Inventory held, awaiting buyer details and payment
    Pending,
    /// Buyer submitted, charge may be in flight
    InPayment,
    /// Paid (or free) and confirmed
    Complete,
    /// Explicitly cancelled by the buyer
    Cancelled,
    /// Hold lapsed and was reclaimed
    Expired,
}

impl ReservationStatus {
    /// Whether this status admits no further transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Expired)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::InPayment => "IN_PAYMENT",
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{label}")
    }
}

/// Line items of a reservation; requests rarely span more than a few
/// categories
pub type LineItems = SmallVec<[LineItem; 4]>;

/// A reservation: a time-bounded hold on inventory that advances through
/// the lifecycle state machine.
///
/// Owned exclusively by the lifecycle engine; the store only persists and
/// retrieves it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Opaque identifier
    pub id: ReservationId,
    /// Owning event
    pub event_id: EventId,
    /// Ordered (category, quantity, unit price) lines
    pub line_items: LineItems,
    /// Tickets created atomically with the allocation
    pub tickets: Vec<Ticket>,
    /// Current lifecycle status
    pub status: ReservationStatus,
    /// Hold deadline
    pub validity: ReservationExpiry,
    /// Buyer contact, populated from `InPayment` onward
    pub buyer: Option<BuyerDetails>,
    /// Handle to the ledger allocation backing this hold
    pub allocation: crate::inventory::AllocationToken,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Total cost: sum of the prices captured on the tickets
    #[must_use]
    pub fn total_cost(&self) -> Money {
        self.tickets
            .iter()
            .fold(Money::ZERO, |acc, t| acc.saturating_add(t.paid_price))
    }

    /// Number of tickets in the reservation
    #[must_use]
    pub fn ticket_count(&self) -> u32 {
        self.line_items.iter().map(|l| l.quantity).sum()
    }
}

// ============================================================================
// Read-only Summary Projection
// ============================================================================

/// One display row of a reservation summary: category name, unit price,
/// quantity and subtotal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Category name
    pub category_name: String,
    /// Unit price in cents
    pub unit_price: Money,
    /// Number of tickets
    pub quantity: u32,
    /// `unit_price * quantity`
    pub subtotal: Money,
}

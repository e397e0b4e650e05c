//! Inventory ledger: the single source of truth for sellable capacity.
//!
//! Every category's counters sit behind their own mutex, so the
//! check-then-decrement sequence can never interleave with another
//! allocator on the same category. Multi-category allocations acquire
//! category locks in ascending `CategoryId` order, which makes concurrent
//! `allocate_many` calls deadlock-free, then validate every line before
//! committing any of them.
//!
//! Invariant, per category, under any interleaving:
//! `pending + confirmed <= total`.

use crate::errors::LedgerError;
use crate::types::{Capacity, CategoryId, TicketCategory};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Handle to a successful capacity reduction.
///
/// Used later to release the hold (idempotent) or confirm it on
/// reservation completion. The token itself is inert data; the ledger's
/// registry holds the authoritative state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationToken {
    id: Uuid,
    lines: SmallVec<[(CategoryId, u32); 4]>,
}

impl AllocationToken {
    /// The allocated (category, quantity) lines, sorted by category id
    #[must_use]
    pub fn lines(&self) -> &[(CategoryId, u32)] {
        &self.lines
    }
}

/// Per-category counters visible to callers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAvailability {
    /// Total sellable capacity
    pub total: u32,
    /// Held by pending reservations
    pub pending: u32,
    /// Confirmed (sold)
    pub confirmed: u32,
}

impl CategoryAvailability {
    /// Capacity not yet held or sold
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.total - self.pending - self.confirmed
    }
}

#[derive(Debug)]
struct Counters {
    total: u32,
    pending: u32,
    confirmed: u32,
}

impl Counters {
    const fn available(&self) -> u32 {
        self.total - self.pending - self.confirmed
    }
}

#[derive(Debug)]
struct CategoryRecord {
    category: TicketCategory,
    counters: Mutex<Counters>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenState {
    Pending,
    Confirmed,
    Released,
}

#[derive(Debug)]
struct TokenRecord {
    lines: SmallVec<[(CategoryId, u32); 4]>,
    state: TokenState,
}

/// The inventory ledger.
///
/// Lock discipline: category locks are only ever acquired in ascending
/// `CategoryId` order, and never while the token registry lock is held.
#[derive(Debug, Default)]
pub struct InventoryLedger {
    categories: RwLock<HashMap<CategoryId, Arc<CategoryRecord>>>,
    tokens: Mutex<HashMap<Uuid, TokenRecord>>,
}

impl InventoryLedger {
    /// Creates an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a category, making its capacity sellable.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CategoryAlreadyPublished`] if the id is
    /// already present.
    pub fn publish_category(&self, category: TicketCategory) -> Result<(), LedgerError> {
        let mut categories = self.categories.write();
        if categories.contains_key(&category.id) {
            return Err(LedgerError::CategoryAlreadyPublished(category.id));
        }
        let record = CategoryRecord {
            counters: Mutex::new(Counters {
                total: category.capacity.value(),
                pending: 0,
                confirmed: 0,
            }),
            category,
        };
        categories.insert(record.category.id, Arc::new(record));
        Ok(())
    }

    /// Looks up a published category definition
    #[must_use]
    pub fn category(&self, id: &CategoryId) -> Option<TicketCategory> {
        self.categories.read().get(id).map(|r| r.category.clone())
    }

    /// Current counters for a category.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownCategory`] if the id is not published.
    pub fn availability(&self, id: &CategoryId) -> Result<CategoryAvailability, LedgerError> {
        let record = self.record(id)?;
        let counters = record.counters.lock();
        Ok(CategoryAvailability {
            total: counters.total,
            pending: counters.pending,
            confirmed: counters.confirmed,
        })
    }

    /// Adjusts a category's total capacity. The only mutation of a
    /// published category permitted outside allocation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownCategory`] for an unpublished id, or
    /// [`LedgerError::CapacityBelowAllocation`] if the new total is below
    /// what is already pending or confirmed.
    pub fn adjust_capacity(&self, id: &CategoryId, new_total: Capacity) -> Result<(), LedgerError> {
        let record = self.record(id)?;
        let mut counters = record.counters.lock();
        let allocated = counters.pending + counters.confirmed;
        if new_total.value() < allocated {
            return Err(LedgerError::CapacityBelowAllocation {
                category: *id,
                requested: new_total.value(),
                allocated,
            });
        }
        counters.total = new_total.value();
        tracing::info!(category = %id, total = counters.total, "category capacity adjusted");
        Ok(())
    }

    /// Allocates `quantity` from a single category.
    ///
    /// # Errors
    ///
    /// See [`InventoryLedger::allocate_many`].
    pub fn allocate(&self, id: CategoryId, quantity: u32) -> Result<AllocationToken, LedgerError> {
        self.allocate_many(&[(id, quantity)])
    }

    /// All-or-nothing allocation across multiple categories.
    ///
    /// Duplicate category lines are coalesced by summing their quantities.
    /// If any category lacks capacity, no counter is mutated.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownCategory`] if any line references an
    /// unpublished category, or [`LedgerError::InsufficientCapacity`] for
    /// the first category that cannot satisfy its line.
    pub fn allocate_many(
        &self,
        requests: &[(CategoryId, u32)],
    ) -> Result<AllocationToken, LedgerError> {
        // Coalesce and sort: one line per category, ascending id, so locks
        // are always taken in the same global order.
        let mut lines: SmallVec<[(CategoryId, u32); 4]> = SmallVec::new();
        for &(id, quantity) in requests {
            if quantity == 0 {
                continue;
            }
            match lines.iter_mut().find(|(existing, _)| *existing == id) {
                Some((_, q)) => *q = q.saturating_add(quantity),
                None => lines.push((id, quantity)),
            }
        }
        lines.sort_unstable_by_key(|(id, _)| *id);

        // Resolve all records up front; an unknown category mutates nothing.
        let records: Vec<Arc<CategoryRecord>> = {
            let categories = self.categories.read();
            lines
                .iter()
                .map(|(id, _)| {
                    categories
                        .get(id)
                        .cloned()
                        .ok_or(LedgerError::UnknownCategory(*id))
                })
                .collect::<Result<_, _>>()?
        };

        // Lock every category in order, validate every line, then commit.
        let mut guards: Vec<parking_lot::MutexGuard<'_, Counters>> =
            Vec::with_capacity(records.len());
        for record in &records {
            guards.push(record.counters.lock());
        }

        for (guard, (id, quantity)) in guards.iter().zip(lines.iter()) {
            if guard.available() < *quantity {
                metrics::counter!("ledger.allocations.rejected").increment(1);
                tracing::debug!(
                    category = %id,
                    requested = quantity,
                    available = guard.available(),
                    "allocation denied"
                );
                return Err(LedgerError::InsufficientCapacity {
                    category: *id,
                    requested: *quantity,
                    available: guard.available(),
                });
            }
        }

        for (guard, (_, quantity)) in guards.iter_mut().zip(lines.iter()) {
            guard.pending += quantity;
        }
        drop(guards);

        let token = AllocationToken {
            id: Uuid::new_v4(),
            lines: lines.clone(),
        };
        self.tokens.lock().insert(
            token.id,
            TokenRecord {
                lines,
                state: TokenState::Pending,
            },
        );

        metrics::counter!("ledger.allocations.committed").increment(1);
        tracing::debug!(token = %token.id, lines = token.lines.len(), "allocation committed");
        Ok(token)
    }

    /// Releases a pending allocation, returning its capacity to the pool.
    ///
    /// Idempotent: releasing an already-released or confirmed token is a
    /// no-op and never double-credits capacity. An unknown token (for
    /// example after a restart) is also a no-op.
    pub fn release(&self, token: &AllocationToken) {
        let lines = {
            let mut tokens = self.tokens.lock();
            match tokens.get_mut(&token.id) {
                Some(record) if record.state == TokenState::Pending => {
                    record.state = TokenState::Released;
                    record.lines.clone()
                }
                _ => return,
            }
        };

        let categories = self.categories.read();
        for (id, quantity) in &lines {
            if let Some(record) = categories.get(id) {
                let mut counters = record.counters.lock();
                counters.pending = counters.pending.saturating_sub(*quantity);
            }
        }
        metrics::counter!("ledger.allocations.released").increment(1);
        tracing::debug!(token = %token.id, "allocation released");
    }

    /// Converts a pending allocation into a confirmed one, used on
    /// reservation completion. Confirmed capacity is not reclaimable by
    /// expiration.
    ///
    /// Confirming an already-confirmed token is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TokenReleased`] if the hold was already
    /// released (or the token is unknown): its capacity may have been
    /// resold and must not be claimed.
    pub fn confirm(&self, token: &AllocationToken) -> Result<(), LedgerError> {
        let lines = {
            let mut tokens = self.tokens.lock();
            match tokens.get_mut(&token.id) {
                Some(record) if record.state == TokenState::Pending => {
                    record.state = TokenState::Confirmed;
                    record.lines.clone()
                }
                Some(record) if record.state == TokenState::Confirmed => return Ok(()),
                _ => return Err(LedgerError::TokenReleased),
            }
        };

        let categories = self.categories.read();
        for (id, quantity) in &lines {
            if let Some(record) = categories.get(id) {
                let mut counters = record.counters.lock();
                counters.pending = counters.pending.saturating_sub(*quantity);
                counters.confirmed += quantity;
            }
        }
        metrics::counter!("ledger.allocations.confirmed").increment(1);
        tracing::debug!(token = %token.id, "allocation confirmed");
        Ok(())
    }

    fn record(&self, id: &CategoryId) -> Result<Arc<CategoryRecord>, LedgerError> {
        self.categories
            .read()
            .get(id)
            .cloned()
            .ok_or(LedgerError::UnknownCategory(*id))
    }
}

//! # Boxoffice Testing
//!
//! Testing utilities and mock collaborators for the boxoffice engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`mocks::FixedClock`], [`mocks::ManualClock`])
//! - A scripted payment gateway with queued outcomes
//! - A recording notifier that captures sent messages
//! - Builders for categories and ticket requests
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_testing::{mocks::ManualClock, builders::category};
//!
//! let clock = Arc::new(ManualClock::starting_at(test_clock().now()));
//! let lifecycle = ReservationLifecycle::new(ledger, store, payments, notifier, clock.clone(), config);
//! clock.advance(Duration::minutes(30));
//! // holds created before the advance are now expired
//! ```

use chrono::{DateTime, Utc};

/// Mock implementations of the engine's injected dependencies
pub mod mocks {
    use super::{DateTime, Utc};
    use async_trait::async_trait;
    use boxoffice_core::environment::Clock;
    use boxoffice_core::notify::{Notifier, TemplateKind};
    use boxoffice_core::payment::{ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway};
    use boxoffice_core::types::{Reservation, ReservationId};
    use chrono::Duration;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Advanceable clock for expiry tests.
    ///
    /// Starts at a given instant and only moves when told to, so deadline
    /// crossings happen exactly where the test puts them.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a manual clock at the given instant
        #[must_use]
        pub const fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock();
            *time += by;
        }

        /// Jump the clock to an exact instant
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock() = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock()
        }
    }

    /// One scripted gateway response
    #[derive(Clone, Debug)]
    pub enum ScriptedOutcome {
        /// Capture the charge
        Approve,
        /// Definite decline with the given reason
        Decline(String),
        /// Transport failure; outcome unknown to the caller
        Unavailable(String),
        /// Never respond, forcing the orchestrator timeout
        Hang,
    }

    /// Payment gateway that replays a queue of scripted outcomes.
    ///
    /// When the queue is empty every charge is approved. All requests are
    /// recorded for assertion, and captures are deduplicated on the
    /// idempotency key like a real processor.
    #[derive(Debug, Default)]
    pub struct ScriptedGateway {
        script: Mutex<VecDeque<ScriptedOutcome>>,
        requests: Mutex<Vec<ChargeRequest>>,
        captured: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        /// Create a gateway that approves everything
        #[must_use]
        pub fn approving() -> Self {
            Self::default()
        }

        /// Create a gateway that replays the given outcomes in order
        #[must_use]
        pub fn with_script(outcomes: impl IntoIterator<Item = ScriptedOutcome>) -> Self {
            Self {
                script: Mutex::new(outcomes.into_iter().collect()),
                ..Self::default()
            }
        }

        /// Push another outcome onto the script
        pub fn push(&self, outcome: ScriptedOutcome) {
            self.script.lock().push_back(outcome);
        }

        /// Every charge request seen so far
        #[must_use]
        pub fn requests(&self) -> Vec<ChargeRequest> {
            self.requests.lock().clone()
        }

        /// Idempotency keys of captured charges, duplicates excluded
        #[must_use]
        pub fn captured_keys(&self) -> Vec<String> {
            self.captured.lock().clone()
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
            self.requests.lock().push(request.clone());
            let outcome = self
                .script
                .lock()
                .pop_front()
                .unwrap_or(ScriptedOutcome::Approve);
            match outcome {
                ScriptedOutcome::Approve => {
                    let mut captured = self.captured.lock();
                    if !captured.contains(&request.idempotency_key) {
                        captured.push(request.idempotency_key.clone());
                    }
                    Ok(ChargeReceipt {
                        charge_id: format!("scripted-{}", request.idempotency_key),
                        amount: request.amount,
                    })
                }
                ScriptedOutcome::Decline(reason) => Err(GatewayError::Declined { reason }),
                ScriptedOutcome::Unavailable(message) => {
                    Err(GatewayError::Unavailable { message })
                }
                ScriptedOutcome::Hang => {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    Err(GatewayError::Unavailable {
                        message: "hung call awoke".to_string(),
                    })
                }
            }
        }

        async fn refund(&self, receipt: &ChargeReceipt) -> Result<(), GatewayError> {
            self.captured
                .lock()
                .retain(|key| !receipt.charge_id.ends_with(key));
            Ok(())
        }
    }

    /// Notifier that records every message instead of delivering it
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(TemplateKind, ReservationId)>>,
    }

    impl RecordingNotifier {
        /// Create a fresh recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Every (template, reservation) pair sent so far
        #[must_use]
        pub fn sent(&self) -> Vec<(TemplateKind, ReservationId)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            template: TemplateKind,
            reservation: &Reservation,
        ) -> Result<(), String> {
            self.sent.lock().push((template, reservation.id));
            Ok(())
        }
    }
}

/// Builders for common test fixtures
pub mod builders {
    use boxoffice_core::types::{
        Capacity, CategoryId, EventId, Money, SaleWindow, TicketCategory, TicketRequest,
    };
    use chrono::{DateTime, Duration, Utc};

    /// A category on sale around `now`, with the given capacity and price
    /// in cents
    #[must_use]
    pub fn category(event_id: EventId, now: DateTime<Utc>, capacity: u32, cents: u64) -> TicketCategory {
        TicketCategory::new(
            CategoryId::new(),
            event_id,
            "General Admission".to_string(),
            Capacity::new(capacity),
            Money::from_cents(cents),
            SaleWindow::new(
                now - Duration::hours(1),
                now + Duration::days(30),
                "UTC".to_string(),
            ),
            false,
        )
    }

    /// Shorthand for a (category, quantity) request
    #[must_use]
    pub const fn request(category_id: CategoryId, quantity: u32) -> TicketRequest {
        TicketRequest::new(category_id, quantity)
    }
}

// Re-export commonly used items
pub use mocks::{
    FixedClock, ManualClock, RecordingNotifier, ScriptedGateway, ScriptedOutcome, test_clock,
};

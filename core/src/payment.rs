//! Payment orchestration.
//!
//! The orchestrator is the only component that talks to the gateway. It
//! derives a deterministic idempotency key from the reservation id, bounds
//! every call with a timeout, and tracks reservations whose charge outcome
//! is unknown so that only a same-key retry can follow an ambiguous
//! failure.

use crate::config::EngineConfig;
use crate::errors::PaymentError;
use crate::types::{Money, ReservationId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// A charge submitted to the gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Reservation being paid for
    pub reservation_id: ReservationId,
    /// Amount to capture
    pub amount: Money,
    /// ISO 4217 currency code
    pub currency: String,
    /// Opaque card token collected by the caller
    pub card_token: String,
    /// Deterministic key; the gateway deduplicates on it
    pub idempotency_key: String,
}

/// Proof of a captured charge, kept for compensation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeReceipt {
    /// Gateway-assigned charge identifier
    pub charge_id: String,
    /// Amount captured
    pub amount: Money,
}

/// Outcome of a gateway call, before orchestrator policy is applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayError {
    /// Definite refusal
    Declined {
        /// Gateway-provided reason
        reason: String,
    },
    /// Transport failure; the charge state is unknown
    Unavailable {
        /// Description of the failure
        message: String,
    },
}

/// External payment processor boundary.
///
/// Implementations must deduplicate charges on the idempotency key: a
/// retry with the same key must not capture twice.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Attempts to capture the requested amount
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError>;

    /// Reverses a previously captured charge
    async fn refund(&self, receipt: &ChargeReceipt) -> Result<(), GatewayError>;
}

/// Drives charges against the gateway with timeout and ambiguity
/// bookkeeping.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    timeout: Duration,
    currency: String,
    uncertain: Mutex<HashSet<ReservationId>>,
}

impl PaymentOrchestrator {
    /// Creates an orchestrator over the given gateway
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: &EngineConfig) -> Self {
        Self {
            gateway,
            timeout: config.gateway_timeout,
            currency: config.currency.clone(),
            uncertain: Mutex::new(HashSet::new()),
        }
    }

    /// The idempotency key for a reservation. Deterministic, so a retry
    /// after an ambiguous failure reuses the same key and the gateway can
    /// deduplicate.
    #[must_use]
    pub fn idempotency_key(id: ReservationId) -> String {
        format!("boxoffice-res-{}", id.as_uuid())
    }

    /// Whether the last charge attempt for this reservation ended without
    /// a definite outcome
    #[must_use]
    pub fn is_uncertain(&self, id: &ReservationId) -> bool {
        self.uncertain.lock().contains(id)
    }

    /// Charges the reservation's total.
    ///
    /// A timeout or gateway transport failure marks the reservation as
    /// uncertain and surfaces as [`PaymentError::GatewayUnavailable`]; any
    /// definite outcome clears the marker.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Declined`] on a definite refusal, or
    /// [`PaymentError::GatewayUnavailable`] when the outcome is unknown.
    pub async fn charge(
        &self,
        reservation_id: ReservationId,
        amount: Money,
        card_token: &str,
    ) -> Result<ChargeReceipt, PaymentError> {
        let request = ChargeRequest {
            reservation_id,
            amount,
            currency: self.currency.clone(),
            card_token: card_token.to_string(),
            idempotency_key: Self::idempotency_key(reservation_id),
        };

        let outcome = tokio::time::timeout(self.timeout, self.gateway.charge(&request)).await;
        match outcome {
            Ok(Ok(receipt)) => {
                self.uncertain.lock().remove(&reservation_id);
                metrics::counter!("payment.charges.captured").increment(1);
                tracing::info!(
                    reservation = %reservation_id,
                    charge = %receipt.charge_id,
                    amount = %receipt.amount,
                    "charge captured"
                );
                Ok(receipt)
            }
            Ok(Err(GatewayError::Declined { reason })) => {
                self.uncertain.lock().remove(&reservation_id);
                metrics::counter!("payment.charges.declined").increment(1);
                tracing::info!(reservation = %reservation_id, reason, "charge declined");
                Err(PaymentError::Declined { reason })
            }
            Ok(Err(GatewayError::Unavailable { message })) => {
                self.mark_uncertain(reservation_id);
                Err(PaymentError::GatewayUnavailable { message })
            }
            Err(_) => {
                self.mark_uncertain(reservation_id);
                Err(PaymentError::GatewayUnavailable {
                    message: "gateway call timed out".to_string(),
                })
            }
        }
    }

    /// Compensating refund for a captured charge that cannot be honored.
    /// Failures are logged and returned; the caller decides whether to
    /// queue a retry.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::GatewayUnavailable`] if the refund could
    /// not be confirmed.
    pub async fn refund(&self, receipt: &ChargeReceipt) -> Result<(), PaymentError> {
        let outcome = tokio::time::timeout(self.timeout, self.gateway.refund(receipt)).await;
        match outcome {
            Ok(Ok(())) => {
                metrics::counter!("payment.refunds.issued").increment(1);
                tracing::info!(charge = %receipt.charge_id, "refund issued");
                Ok(())
            }
            Ok(Err(GatewayError::Declined { reason })) => {
                metrics::counter!("payment.refunds.failed").increment(1);
                tracing::error!(charge = %receipt.charge_id, reason, "refund refused");
                Err(PaymentError::GatewayUnavailable { message: reason })
            }
            Ok(Err(GatewayError::Unavailable { message })) => {
                metrics::counter!("payment.refunds.failed").increment(1);
                tracing::error!(charge = %receipt.charge_id, message, "refund failed");
                Err(PaymentError::GatewayUnavailable { message })
            }
            Err(_) => {
                metrics::counter!("payment.refunds.failed").increment(1);
                tracing::error!(charge = %receipt.charge_id, "refund timed out");
                Err(PaymentError::GatewayUnavailable {
                    message: "refund call timed out".to_string(),
                })
            }
        }
    }

    fn mark_uncertain(&self, id: ReservationId) {
        self.uncertain.lock().insert(id);
        metrics::counter!("payment.charges.uncertain").increment(1);
        tracing::warn!(reservation = %id, "charge outcome unknown, retry requires same key");
    }
}

/// Simulated gateway for demos: approves everything after a small random
/// delay, deduplicating on the idempotency key.
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    captured: Mutex<HashSet<String>>,
}

impl MockPaymentGateway {
    /// Creates a fresh mock gateway
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        use rand::Rng as _;
        let jitter_ms = rand::thread_rng().gen_range(10..80);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        let mut captured = self.captured.lock();
        if !captured.insert(request.idempotency_key.clone()) {
            tracing::debug!(key = %request.idempotency_key, "duplicate charge coalesced");
        }
        Ok(ChargeReceipt {
            charge_id: format!("mock-{}", request.idempotency_key),
            amount: request.amount,
        })
    }

    async fn refund(&self, receipt: &ChargeReceipt) -> Result<(), GatewayError> {
        self.captured.lock().remove(&receipt.charge_id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct FlakyGateway {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl PaymentGateway for FlakyGateway {
        async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
            let mut calls = self.calls.lock();
            *calls += 1;
            if *calls == 1 {
                Err(GatewayError::Unavailable {
                    message: "connection reset".to_string(),
                })
            } else {
                Ok(ChargeReceipt {
                    charge_id: request.idempotency_key.clone(),
                    amount: request.amount,
                })
            }
        }

        async fn refund(&self, _receipt: &ChargeReceipt) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let id = ReservationId::new();
        assert_eq!(
            PaymentOrchestrator::idempotency_key(id),
            PaymentOrchestrator::idempotency_key(id)
        );
        assert!(PaymentOrchestrator::idempotency_key(id).starts_with("boxoffice-res-"));
    }

    #[tokio::test]
    async fn test_unavailable_marks_uncertain_and_retry_clears_it() {
        let orchestrator = PaymentOrchestrator::new(
            Arc::new(FlakyGateway {
                calls: Mutex::new(0),
            }),
            &EngineConfig::default(),
        );
        let id = ReservationId::new();

        let err = orchestrator
            .charge(id, Money::from_cents(5000), "tok_visa")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::GatewayUnavailable { .. }));
        assert!(orchestrator.is_uncertain(&id));

        let receipt = orchestrator
            .charge(id, Money::from_cents(5000), "tok_visa")
            .await
            .unwrap();
        assert_eq!(receipt.amount, Money::from_cents(5000));
        assert!(!orchestrator.is_uncertain(&id));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_unavailable() {
        struct HangingGateway;

        #[async_trait]
        impl PaymentGateway for HangingGateway {
            async fn charge(
                &self,
                _request: &ChargeRequest,
            ) -> Result<ChargeReceipt, GatewayError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::Unavailable {
                    message: "never reached".to_string(),
                })
            }

            async fn refund(&self, _receipt: &ChargeReceipt) -> Result<(), GatewayError> {
                Ok(())
            }
        }

        let config = EngineConfig {
            gateway_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let orchestrator = PaymentOrchestrator::new(Arc::new(HangingGateway), &config);
        let id = ReservationId::new();

        let err = orchestrator
            .charge(id, Money::from_cents(100), "tok_visa")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::GatewayUnavailable { .. }));
        assert!(orchestrator.is_uncertain(&id));
    }

    #[tokio::test]
    async fn test_mock_gateway_deduplicates_on_key() {
        let gateway = MockPaymentGateway::new();
        let request = ChargeRequest {
            reservation_id: ReservationId::new(),
            amount: Money::from_cents(2500),
            currency: "USD".to_string(),
            card_token: "tok_visa".to_string(),
            idempotency_key: "boxoffice-res-test".to_string(),
        };

        let first = gateway.charge(&request).await.unwrap();
        let second = gateway.charge(&request).await.unwrap();
        assert_eq!(first, second);
    }
}

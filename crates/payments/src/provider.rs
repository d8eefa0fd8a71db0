use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use common::Money;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by the provider edge. Always treated as transient;
/// the service decides when to stop retrying.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// The payment provider gateway.
///
/// Outage mode is part of the trait so operators can flip it at runtime
/// to rehearse dead-letter handling.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a payment at the provider and returns its id there.
    /// Idempotent per `idempotency_key` on the provider side.
    async fn create_payment(
        &self,
        idempotency_key: &str,
        amount: Money,
        currency: &str,
    ) -> Result<String, ProviderError>;

    fn set_outage_mode(&self, enabled: bool);

    fn outage_mode(&self) -> bool;
}

/// Stand-in gateway: no network, a configurable random failure rate,
/// and an outage switch that fails every call.
pub struct SimulatedPaymentProvider {
    outage: AtomicBool,
    /// Probability in [0, 1] that a call fails even outside an outage.
    failure_rate: f64,
    calls: AtomicU64,
}

impl SimulatedPaymentProvider {
    pub fn new(failure_rate: f64) -> Self {
        SimulatedPaymentProvider {
            outage: AtomicBool::new(false),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            calls: AtomicU64::new(0),
        }
    }

    /// A provider that always succeeds.
    pub fn reliable() -> Self {
        Self::new(0.0)
    }

    /// How many create calls have been made, for test assertions.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for SimulatedPaymentProvider {
    async fn create_payment(
        &self,
        _idempotency_key: &str,
        _amount: Money,
        _currency: &str,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.outage.load(Ordering::SeqCst) {
            return Err(ProviderError("provider outage".to_string()));
        }
        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(ProviderError("transient provider failure".to_string()));
        }
        Ok(format!("rzp_{}", Uuid::new_v4().simple()))
    }

    fn set_outage_mode(&self, enabled: bool) {
        self.outage.store(enabled, Ordering::SeqCst);
    }

    fn outage_mode(&self) -> bool {
        self.outage.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reliable_provider_returns_prefixed_ids() {
        let provider = SimulatedPaymentProvider::reliable();
        let id = provider
            .create_payment("key-1", Money::from_cents(1000), "INR")
            .await
            .unwrap();
        assert!(id.starts_with("rzp_"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn outage_mode_fails_every_call() {
        let provider = SimulatedPaymentProvider::reliable();
        provider.set_outage_mode(true);
        assert!(provider.outage_mode());
        assert!(
            provider
                .create_payment("key-1", Money::from_cents(1000), "INR")
                .await
                .is_err()
        );

        provider.set_outage_mode(false);
        assert!(
            provider
                .create_payment("key-1", Money::from_cents(1000), "INR")
                .await
                .is_ok()
        );
    }
}

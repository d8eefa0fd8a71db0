use std::sync::Arc;

use common::{Clock, Money, OrderId, PaymentId, UserId};
use metrics::counter;
use outbox::{DedupGuard, OutboxWriter};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{PaymentError, Result};
use crate::provider::PaymentProvider;
use crate::record::{DeadLetterStatus, Payment, PaymentStatus, ProviderDeadLetter};
use crate::store::{DeadLetterStore, PaymentStore};

/// How many times one intent creation calls the provider before the
/// request is dead-lettered.
pub const PROVIDER_ATTEMPTS: u32 = 3;

/// Currency applied when the order event carries none.
pub const DEFAULT_CURRENCY: &str = "INR";

/// Dead-letter reasons are operator-facing; cap them so one giant
/// provider stack trace does not bloat the table.
const REASON_LIMIT: usize = 250;

/// Outcome of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Settled the payment as authorized.
    Authorized,
    /// Settled the payment as failed.
    Failed,
    /// A duplicate delivery or an already-settled payment.
    AlreadyProcessed,
    /// No payment matches the provider payment id.
    Ignored,
}

/// Payment intents and webhook settlement.
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    webhook_dedup: DedupGuard,
    provider: Arc<dyn PaymentProvider>,
    outbox: OutboxWriter,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        webhook_dedup: DedupGuard,
        provider: Arc<dyn PaymentProvider>,
        outbox: OutboxWriter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        PaymentService {
            store,
            dead_letters,
            webhook_dedup,
            provider,
            outbox,
            clock,
        }
    }

    /// Creates a payment intent, idempotent per key: a retried call
    /// returns the existing intent without touching the provider. When
    /// every provider attempt fails the request is dead-lettered and
    /// the error reports the attempt count.
    #[tracing::instrument(skip(self))]
    pub async fn create_intent(
        &self,
        idempotency_key: &str,
        order_id: &OrderId,
        user_id: UserId,
        amount: Money,
        currency: &str,
    ) -> Result<Payment> {
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount);
        }
        if let Some(existing) = self.store.find_by_idempotency_key(idempotency_key).await? {
            info!(payment_id = %existing.id, idempotency_key, "returning existing intent");
            return Ok(existing);
        }

        let mut last_reason = String::new();
        for attempt in 1..=PROVIDER_ATTEMPTS {
            match self
                .provider
                .create_payment(idempotency_key, amount, currency)
                .await
            {
                Ok(provider_payment_id) => {
                    let payment = self
                        .open_payment(
                            idempotency_key,
                            order_id,
                            user_id,
                            amount,
                            currency,
                            provider_payment_id,
                        )
                        .await?;
                    return Ok(payment);
                }
                Err(err) => {
                    warn!(attempt, idempotency_key, error = %err, "provider call failed");
                    counter!("payment_provider_failures_total").increment(1);
                    last_reason = err.to_string();
                }
            }
        }

        let dead_letter = ProviderDeadLetter {
            id: 0,
            idempotency_key: idempotency_key.to_string(),
            order_id: *order_id,
            user_id,
            amount,
            currency: currency.to_string(),
            status: DeadLetterStatus::Pending,
            attempts: PROVIDER_ATTEMPTS as i32,
            reason: trim_reason(&last_reason),
            created_at: self.clock.now(),
            resolved_at: None,
            requeued_payment_id: None,
        };
        let id = self.dead_letters.insert(&dead_letter).await?;
        counter!("payment_dead_letters_total").increment(1);
        warn!(dead_letter_id = id, order_id = %order_id, "payment request dead-lettered");

        Err(PaymentError::ProviderUnavailable {
            attempts: PROVIDER_ATTEMPTS,
            reason: last_reason,
        })
    }

    /// Intent creation for the saga path. The key is derived from the
    /// order id so a redelivered order event maps onto the same intent.
    pub async fn create_pending_for_order(
        &self,
        order_id: &OrderId,
        user_id: UserId,
        amount: Money,
        currency: Option<&str>,
    ) -> Result<Payment> {
        let key = format!("order:{order_id}");
        self.create_intent(
            &key,
            order_id,
            user_id,
            amount,
            currency.unwrap_or(DEFAULT_CURRENCY),
        )
        .await
    }

    async fn open_payment(
        &self,
        idempotency_key: &str,
        order_id: &OrderId,
        user_id: UserId,
        amount: Money,
        currency: &str,
        provider_payment_id: String,
    ) -> Result<Payment> {
        let now = self.clock.now();
        let payment = Payment {
            id: PaymentId::new(),
            order_id: *order_id,
            user_id,
            idempotency_key: idempotency_key.to_string(),
            provider_payment_id,
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&payment).await?;
        counter!("payments_created_total").increment(1);
        info!(payment_id = %payment.id, order_id = %order_id, "payment intent created");
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: &PaymentId) -> Result<Payment> {
        self.store
            .get(payment_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound(*payment_id))
    }

    pub async fn get_payment_for_order(&self, order_id: &OrderId) -> Result<Payment> {
        self.store
            .find_by_order(order_id)
            .await?
            .ok_or(PaymentError::NoPaymentForOrder(*order_id))
    }

    /// Applies one provider webhook. Deliveries are deduplicated by
    /// provider event id (blank ids are processed; settlement on a
    /// terminal payment is absorbed anyway), and each settlement emits
    /// the matching payment event through the outbox.
    #[tracing::instrument(skip(self))]
    pub async fn handle_webhook(
        &self,
        provider_event_id: Option<&str>,
        provider_payment_id: &str,
        authorized: bool,
        failure_reason: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let fresh = self.webhook_dedup.mark_if_new(provider_event_id).await?;
        if !fresh {
            counter!("payment_webhook_duplicates_total").increment(1);
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let Some(mut payment) = self
            .store
            .find_by_provider_payment_id(provider_payment_id)
            .await?
        else {
            warn!(provider_payment_id, "webhook for unknown payment, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };
        if payment.status.is_terminal() {
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let (status, topic, outcome) = if authorized {
            (
                PaymentStatus::Authorized,
                messaging::topics::PAYMENT_AUTHORIZED,
                WebhookOutcome::Authorized,
            )
        } else {
            (
                PaymentStatus::Failed,
                messaging::topics::PAYMENT_FAILED,
                WebhookOutcome::Failed,
            )
        };

        payment.status = status;
        payment.failure_reason = if authorized {
            None
        } else {
            failure_reason.map(trim_reason)
        };
        payment.updated_at = self.clock.now();
        self.store.update(&payment).await?;

        self.outbox
            .enqueue(
                topic,
                &payment.order_id.to_string(),
                topic,
                json!({
                    "orderId": payment.order_id.to_string(),
                    "paymentId": payment.id.to_string(),
                    "providerPaymentId": payment.provider_payment_id,
                }),
            )
            .await?;

        counter!("payments_settled_total", "status" => status.as_str()).increment(1);
        info!(payment_id = %payment.id, status = %status, "payment settled by webhook");
        Ok(outcome)
    }

    pub async fn list_dead_letters(
        &self,
        status: Option<DeadLetterStatus>,
        limit: usize,
    ) -> Result<Vec<ProviderDeadLetter>> {
        self.dead_letters.list(status, limit).await
    }

    /// Retries a dead-lettered request with one provider call, reusing
    /// the original idempotency key. On success the dead letter is
    /// resolved as `Requeued` and linked to the new payment; on failure
    /// it stays `Pending` with one more attempt on record, and no
    /// second dead letter is ever written.
    #[tracing::instrument(skip(self))]
    pub async fn requeue_dead_letter(&self, id: i64) -> Result<Payment> {
        let mut dead_letter = self
            .dead_letters
            .get(id)
            .await?
            .ok_or(PaymentError::DeadLetterNotFound(id))?;
        if dead_letter.status != DeadLetterStatus::Pending {
            return Err(PaymentError::DeadLetterResolved(id));
        }

        // A payment under this key means an earlier requeue already got
        // through; resolve against it without touching the provider.
        let payment = match self
            .store
            .find_by_idempotency_key(&dead_letter.idempotency_key)
            .await?
        {
            Some(existing) => existing,
            None => {
                let provider_payment_id = match self
                    .provider
                    .create_payment(
                        &dead_letter.idempotency_key,
                        dead_letter.amount,
                        &dead_letter.currency,
                    )
                    .await
                {
                    Ok(provider_payment_id) => provider_payment_id,
                    Err(err) => {
                        counter!("payment_provider_failures_total").increment(1);
                        dead_letter.attempts += 1;
                        dead_letter.reason = trim_reason(&err.to_string());
                        self.dead_letters.update(&dead_letter).await?;
                        warn!(dead_letter_id = id, error = %err, "requeue attempt failed");
                        return Err(PaymentError::ProviderUnavailable {
                            attempts: 1,
                            reason: err.to_string(),
                        });
                    }
                };
                self.open_payment(
                    &dead_letter.idempotency_key,
                    &dead_letter.order_id,
                    dead_letter.user_id,
                    dead_letter.amount,
                    &dead_letter.currency,
                    provider_payment_id,
                )
                .await?
            }
        };

        dead_letter.status = DeadLetterStatus::Requeued;
        dead_letter.resolved_at = Some(self.clock.now());
        dead_letter.requeued_payment_id = Some(payment.id);
        self.dead_letters.update(&dead_letter).await?;
        counter!("payment_dead_letters_requeued_total").increment(1);
        info!(dead_letter_id = id, payment_id = %payment.id, "dead letter requeued");
        Ok(payment)
    }
}

fn trim_reason(reason: &str) -> String {
    if reason.len() <= REASON_LIMIT {
        return reason.to_string();
    }
    let mut end = REASON_LIMIT;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDeadLetterStore, InMemoryPaymentStore};
    use crate::provider::SimulatedPaymentProvider;
    use common::ManualClock;
    use outbox::{InMemoryDedupStore, InMemoryOutboxStore, OutboxStatus, OutboxStore};

    struct Fixture {
        service: PaymentService,
        provider: Arc<SimulatedPaymentProvider>,
        outbox_store: Arc<InMemoryOutboxStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let provider = Arc::new(SimulatedPaymentProvider::reliable());
        let outbox_store = Arc::new(InMemoryOutboxStore::new());
        let service = PaymentService::new(
            Arc::new(InMemoryPaymentStore::new()),
            Arc::new(InMemoryDeadLetterStore::new()),
            DedupGuard::new(Arc::new(InMemoryDedupStore::new()), clock.clone()),
            provider.clone(),
            OutboxWriter::new(outbox_store.clone(), clock.clone(), "payment-service"),
            clock,
        );
        Fixture {
            service,
            provider,
            outbox_store,
        }
    }

    async fn pending_topics(store: &InMemoryOutboxStore) -> Vec<String> {
        store
            .fetch_by_status(OutboxStatus::Pending, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.topic)
            .collect()
    }

    #[tokio::test]
    async fn create_intent_is_idempotent_per_key() {
        let fx = fixture();
        let order_id = OrderId::new();
        let first = fx
            .service
            .create_intent("key-1", &order_id, UserId::new(7), Money::from_cents(1000), "INR")
            .await
            .unwrap();
        let second = fx
            .service
            .create_intent("key-1", &order_id, UserId::new(7), Money::from_cents(1000), "INR")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        // The retry never reached the provider.
        assert_eq!(fx.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_provider_attempts_dead_letter_the_request() {
        let fx = fixture();
        fx.provider.set_outage_mode(true);
        let order_id = OrderId::new();

        let err = fx
            .service
            .create_intent("key-1", &order_id, UserId::new(7), Money::from_cents(1000), "INR")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::ProviderUnavailable { attempts: 3, .. }
        ));
        assert_eq!(fx.provider.call_count(), 3);

        let dead = fx.service.list_dead_letters(None, 10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].status, DeadLetterStatus::Pending);
        assert_eq!(dead[0].attempts, 3);
    }

    #[tokio::test]
    async fn requeue_resolves_dead_letter_once_provider_recovers() {
        let fx = fixture();
        fx.provider.set_outage_mode(true);
        let order_id = OrderId::new();
        fx.service
            .create_intent("key-1", &order_id, UserId::new(7), Money::from_cents(1000), "INR")
            .await
            .unwrap_err();
        let dead = fx.service.list_dead_letters(None, 10).await.unwrap();

        // Still down: stays pending with more attempts on record.
        fx.service.requeue_dead_letter(dead[0].id).await.unwrap_err();
        let dead = fx.service.list_dead_letters(None, 10).await.unwrap();
        assert_eq!(dead[0].status, DeadLetterStatus::Pending);
        assert_eq!(dead[0].attempts, 4);

        fx.provider.set_outage_mode(false);
        let payment = fx.service.requeue_dead_letter(dead[0].id).await.unwrap();
        let dead = fx.service.list_dead_letters(None, 10).await.unwrap();
        assert_eq!(dead[0].status, DeadLetterStatus::Requeued);
        assert_eq!(dead[0].requeued_payment_id, Some(payment.id));
        assert!(dead[0].resolved_at.is_some());

        // A second requeue of the same letter is rejected.
        assert!(matches!(
            fx.service.requeue_dead_letter(dead[0].id).await,
            Err(PaymentError::DeadLetterResolved(_))
        ));
    }

    #[tokio::test]
    async fn failed_requeue_makes_one_call_and_never_duplicates_the_letter() {
        let fx = fixture();
        fx.provider.set_outage_mode(true);
        let order_id = OrderId::new();
        fx.service
            .create_intent("key-1", &order_id, UserId::new(7), Money::from_cents(1000), "INR")
            .await
            .unwrap_err();
        let dead = fx.service.list_dead_letters(None, 10).await.unwrap();

        fx.service.requeue_dead_letter(dead[0].id).await.unwrap_err();

        // One extra provider call, still exactly one dead letter.
        assert_eq!(fx.provider.call_count(), 4);
        let dead = fx.service.list_dead_letters(None, 10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(
            dead.iter()
                .map(|d| d.idempotency_key.as_str())
                .collect::<Vec<_>>(),
            vec!["key-1"]
        );
    }

    #[tokio::test]
    async fn failed_webhook_records_the_reason() {
        let fx = fixture();
        let order_id = OrderId::new();
        let payment = fx
            .service
            .create_pending_for_order(&order_id, UserId::new(7), Money::from_cents(1000), None)
            .await
            .unwrap();
        assert_eq!(payment.failure_reason, None);

        fx.service
            .handle_webhook(
                Some("evt-1"),
                &payment.provider_payment_id,
                false,
                Some("insufficient funds"),
            )
            .await
            .unwrap();

        let settled = fx.service.get_payment(&payment.id).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Failed);
        assert_eq!(settled.failure_reason.as_deref(), Some("insufficient funds"));
    }

    #[tokio::test]
    async fn webhook_settles_payment_and_emits_event() {
        let fx = fixture();
        let order_id = OrderId::new();
        let payment = fx
            .service
            .create_pending_for_order(&order_id, UserId::new(7), Money::from_cents(1000), None)
            .await
            .unwrap();
        assert_eq!(payment.currency, DEFAULT_CURRENCY);

        let outcome = fx
            .service
            .handle_webhook(Some("evt-1"), &payment.provider_payment_id, true, None)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Authorized);
        assert_eq!(
            pending_topics(&fx.outbox_store).await,
            vec![messaging::topics::PAYMENT_AUTHORIZED.to_string()]
        );

        let settled = fx.service.get_payment(&payment.id).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Authorized);
    }

    #[tokio::test]
    async fn duplicate_webhooks_settle_once() {
        let fx = fixture();
        let order_id = OrderId::new();
        let payment = fx
            .service
            .create_pending_for_order(&order_id, UserId::new(7), Money::from_cents(1000), None)
            .await
            .unwrap();

        fx.service
            .handle_webhook(Some("evt-1"), &payment.provider_payment_id, false, Some("card declined"))
            .await
            .unwrap();
        let outcome = fx
            .service
            .handle_webhook(Some("evt-1"), &payment.provider_payment_id, false, Some("card declined"))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::AlreadyProcessed);

        // A distinct event id against a settled payment is absorbed too.
        let outcome = fx
            .service
            .handle_webhook(Some("evt-2"), &payment.provider_payment_id, true, None)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::AlreadyProcessed);

        assert_eq!(pending_topics(&fx.outbox_store).await.len(), 1);
        let settled = fx.service.get_payment(&payment.id).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn webhook_for_unknown_payment_is_ignored() {
        let fx = fixture();
        let outcome = fx
            .service
            .handle_webhook(Some("evt-1"), "rzp_nope", true, None)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn blank_webhook_event_ids_are_processed() {
        let fx = fixture();
        let order_id = OrderId::new();
        let payment = fx
            .service
            .create_pending_for_order(&order_id, UserId::new(7), Money::from_cents(1000), None)
            .await
            .unwrap();

        let outcome = fx
            .service
            .handle_webhook(None, &payment.provider_payment_id, true, None)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Authorized);
    }

    #[test]
    fn reason_trim_respects_char_boundaries() {
        let long = "é".repeat(300);
        let trimmed = trim_reason(&long);
        assert!(trimmed.len() <= REASON_LIMIT);
        assert!(long.starts_with(&trimmed));
    }
}

//! Saga-side consumer: opens a payment intent for each created order.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId, UserId};
use messaging::{ConsumerError, EventConsumer, EventEnvelope, topics};
use outbox::DedupGuard;
use tracing::warn;

use crate::error::PaymentError;
use crate::service::PaymentService;

/// Creates the pending payment for each `order.created.v1`.
/// Deduplicated by event id; the intent key is order-derived as a
/// second line of defense.
pub struct OrderCreatedConsumer {
    service: Arc<PaymentService>,
    dedup: DedupGuard,
}

impl OrderCreatedConsumer {
    pub fn new(service: Arc<PaymentService>, dedup: DedupGuard) -> Self {
        OrderCreatedConsumer { service, dedup }
    }
}

#[async_trait]
impl EventConsumer for OrderCreatedConsumer {
    fn group(&self) -> &'static str {
        "payment-service"
    }

    fn topics(&self) -> &'static [&'static str] {
        &[topics::ORDER_CREATED]
    }

    async fn handle(&self, topic: &str, raw: &str) -> Result<(), ConsumerError> {
        let Some(envelope) = EventEnvelope::parse(raw) else {
            warn!(topic, "malformed event payload, skipping");
            return Ok(());
        };
        let event_id = envelope.event_id.to_string();
        let fresh = self
            .dedup
            .mark_if_new(Some(&event_id))
            .await
            .map_err(|err| ConsumerError::new(err.to_string()))?;
        if !fresh {
            return Ok(());
        }

        let Some(order_id) = envelope
            .payload_str("orderId")
            .and_then(|raw| OrderId::parse(&raw).ok())
        else {
            warn!("order created event without a valid orderId, skipping");
            return Ok(());
        };
        let Some(amount) = envelope.payload_i64("totalAmount") else {
            warn!(order_id = %order_id, "order created event without a total, skipping");
            return Ok(());
        };
        let Some(user_id) = envelope.payload_i64("userId") else {
            warn!(order_id = %order_id, "order created event without a userId, skipping");
            return Ok(());
        };
        let currency = envelope.payload_str("currency");

        match self
            .service
            .create_pending_for_order(
                &order_id,
                UserId::new(user_id),
                Money::from_cents(amount),
                currency.as_deref(),
            )
            .await
        {
            Ok(_) => Ok(()),
            // Already dead-lettered; an operator requeues it, the broker
            // must not redeliver into the same outage.
            Err(PaymentError::ProviderUnavailable { .. }) => Ok(()),
            Err(err) => Err(ConsumerError::new(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDeadLetterStore, InMemoryPaymentStore};
    use crate::provider::{PaymentProvider, SimulatedPaymentProvider};
    use crate::record::PaymentStatus;
    use common::ManualClock;
    use outbox::{InMemoryDedupStore, InMemoryOutboxStore, OutboxWriter};
    use serde_json::json;

    struct Fixture {
        consumer: OrderCreatedConsumer,
        service: Arc<PaymentService>,
        provider: Arc<SimulatedPaymentProvider>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let provider = Arc::new(SimulatedPaymentProvider::reliable());
        let service = Arc::new(PaymentService::new(
            Arc::new(InMemoryPaymentStore::new()),
            Arc::new(InMemoryDeadLetterStore::new()),
            DedupGuard::new(Arc::new(InMemoryDedupStore::new()), clock.clone()),
            provider.clone(),
            OutboxWriter::new(
                Arc::new(InMemoryOutboxStore::new()),
                clock.clone(),
                "payment-service",
            ),
            clock.clone(),
        ));
        let dedup = DedupGuard::new(Arc::new(InMemoryDedupStore::new()), clock.clone());
        Fixture {
            consumer: OrderCreatedConsumer::new(service.clone(), dedup),
            service,
            provider,
            clock,
        }
    }

    fn order_created(fx: &Fixture, order_id: &OrderId) -> String {
        EventEnvelope::new(
            topics::ORDER_CREATED,
            "order-service",
            json!({
                "orderId": order_id.to_string(),
                "userId": 42,
                "totalAmount": 2500,
                "currency": "USD",
            }),
            fx.clock.as_ref(),
        )
        .to_json()
        .unwrap()
    }

    #[tokio::test]
    async fn order_created_opens_a_pending_intent() {
        let fx = fixture();
        let order_id = OrderId::new();
        let raw = order_created(&fx, &order_id);
        fx.consumer.handle(topics::ORDER_CREATED, &raw).await.unwrap();

        let payment = fx.service.get_payment_for_order(&order_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.user_id, UserId::new(42));
        assert_eq!(payment.amount, Money::from_cents(2500));
        assert_eq!(payment.currency, "USD");
    }

    #[tokio::test]
    async fn redelivery_does_not_call_the_provider_again() {
        let fx = fixture();
        let order_id = OrderId::new();
        let raw = order_created(&fx, &order_id);
        fx.consumer.handle(topics::ORDER_CREATED, &raw).await.unwrap();
        fx.consumer.handle(topics::ORDER_CREATED, &raw).await.unwrap();

        assert_eq!(fx.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_outage_is_not_a_consumer_error() {
        let fx = fixture();
        fx.provider.set_outage_mode(true);
        let order_id = OrderId::new();
        let raw = order_created(&fx, &order_id);

        fx.consumer.handle(topics::ORDER_CREATED, &raw).await.unwrap();
        let dead = fx.service.list_dead_letters(None, 10).await.unwrap();
        assert_eq!(dead.len(), 1);
    }
}

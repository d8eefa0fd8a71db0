//! Consumers that settle orders from downstream saga events.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use messaging::{ConsumerError, EventConsumer, EventEnvelope, topics};
use outbox::DedupGuard;
use tracing::{info, warn};

use crate::error::OrderError;
use crate::service::OrderService;

/// Applies payment outcomes to orders.
///
/// Carries no dedup guard: `mark_payment_authorized` and
/// `mark_payment_failed` are no-ops on terminal orders, so redelivery
/// is already harmless.
pub struct PaymentResultConsumer {
    service: Arc<OrderService>,
}

impl PaymentResultConsumer {
    pub fn new(service: Arc<OrderService>) -> Self {
        PaymentResultConsumer { service }
    }
}

#[async_trait]
impl EventConsumer for PaymentResultConsumer {
    fn group(&self) -> &'static str {
        "order-service"
    }

    fn topics(&self) -> &'static [&'static str] {
        &[topics::PAYMENT_AUTHORIZED, topics::PAYMENT_FAILED]
    }

    async fn handle(&self, topic: &str, raw: &str) -> Result<(), ConsumerError> {
        let Some(order_id) = order_id_of(topic, raw) else {
            return Ok(());
        };
        let result = if topic == topics::PAYMENT_AUTHORIZED {
            self.service.mark_payment_authorized(&order_id).await
        } else {
            self.service.mark_payment_failed(&order_id).await
        };
        match result {
            Ok(()) => {
                info!(order_id = %order_id, topic, "payment result applied to order");
                Ok(())
            }
            // The payment service may settle a payment for an order this
            // instance never stored (e.g. replay across environments).
            Err(OrderError::OrderNotFound(_)) => {
                warn!(order_id = %order_id, topic, "payment result for unknown order, skipping");
                Ok(())
            }
            Err(err) => Err(ConsumerError::new(err.to_string())),
        }
    }
}

/// Cancels an order when inventory could not cover it. Deduplicated:
/// the cancellation itself is idempotent but the log line and metric
/// should fire once per distinct failure.
pub struct ReservationFailedConsumer {
    service: Arc<OrderService>,
    dedup: DedupGuard,
}

impl ReservationFailedConsumer {
    pub fn new(service: Arc<OrderService>, dedup: DedupGuard) -> Self {
        ReservationFailedConsumer { service, dedup }
    }
}

#[async_trait]
impl EventConsumer for ReservationFailedConsumer {
    fn group(&self) -> &'static str {
        "order-service"
    }

    fn topics(&self) -> &'static [&'static str] {
        &[topics::INVENTORY_RESERVATION_FAILED]
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
            warn!(topic, "reservation failure without a valid orderId, skipping");
            return Ok(());
        };
        let reason = envelope
            .payload_str("reason")
            .unwrap_or_else(|| "unspecified".to_string());
        warn!(order_id = %order_id, reason, "reservation failed, cancelling order");

        match self.service.mark_payment_failed(&order_id).await {
            Ok(()) | Err(OrderError::OrderNotFound(_)) => Ok(()),
            Err(err) => Err(ConsumerError::new(err.to_string())),
        }
    }
}

fn order_id_of(topic: &str, raw: &str) -> Option<OrderId> {
    let envelope = EventEnvelope::parse(raw)?;
    let order_id = envelope.payload_str("orderId")?;
    match OrderId::parse(&order_id) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(topic, "event without a valid orderId, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOrderStore;
    use crate::record::{NewOrderItem, OrderStatus};
    use common::{ManualClock, Money, Sku, UserId};
    use outbox::{InMemoryDedupStore, InMemoryOutboxStore, OutboxWriter};
    use serde_json::json;

    struct Fixture {
        service: Arc<OrderService>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryOrderStore::new());
        let outbox = OutboxWriter::new(
            Arc::new(InMemoryOutboxStore::new()),
            clock.clone(),
            "order-service",
        );
        Fixture {
            service: Arc::new(OrderService::new(store, outbox, clock.clone())),
            clock,
        }
    }

    async fn create_order(fx: &Fixture) -> OrderId {
        fx.service
            .create_order(
                UserId::new(7),
                "INR",
                vec![NewOrderItem {
                    product_id: 1,
                    sku: Sku::new("SKU-1"),
                    quantity: 1,
                    unit_price: Money::from_cents(1000),
                }],
            )
            .await
            .unwrap()
            .id
    }

    fn event(fx: &Fixture, topic: &str, payload: serde_json::Value) -> String {
        EventEnvelope::new(topic, "payment-service", payload, fx.clock.as_ref())
            .to_json()
            .unwrap()
    }

    #[tokio::test]
    async fn payment_authorized_confirms_the_order() {
        let fx = fixture();
        let order_id = create_order(&fx).await;
        let consumer = PaymentResultConsumer::new(fx.service.clone());

        let raw = event(
            &fx,
            topics::PAYMENT_AUTHORIZED,
            json!({"orderId": order_id.to_string()}),
        );
        consumer.handle(topics::PAYMENT_AUTHORIZED, &raw).await.unwrap();
        consumer.handle(topics::PAYMENT_AUTHORIZED, &raw).await.unwrap();

        let order = fx.service.get_order(&order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn unknown_order_is_not_an_error() {
        let fx = fixture();
        let consumer = PaymentResultConsumer::new(fx.service.clone());
        let raw = event(
            &fx,
            topics::PAYMENT_FAILED,
            json!({"orderId": OrderId::new().to_string()}),
        );
        consumer.handle(topics::PAYMENT_FAILED, &raw).await.unwrap();
    }

    #[tokio::test]
    async fn reservation_failure_cancels_order_once() {
        let fx = fixture();
        let order_id = create_order(&fx).await;
        let dedup = DedupGuard::new(Arc::new(InMemoryDedupStore::new()), fx.clock.clone());
        let consumer = ReservationFailedConsumer::new(fx.service.clone(), dedup);

        let raw = event(
            &fx,
            topics::INVENTORY_RESERVATION_FAILED,
            json!({"orderId": order_id.to_string(), "reason": "insufficient stock"}),
        );
        consumer
            .handle(topics::INVENTORY_RESERVATION_FAILED, &raw)
            .await
            .unwrap();
        consumer
            .handle(topics::INVENTORY_RESERVATION_FAILED, &raw)
            .await
            .unwrap();

        let order = fx.service.get_order(&order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }
}

//! Saga-side consumer: reserves stock when orders are created and settles
//! reservations when payment resolves.

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, Sku};
use messaging::{ConsumerError, EventConsumer, EventEnvelope, topics};
use outbox::{DedupGuard, OutboxWriter};
use serde_json::json;
use tracing::{info, warn};

use crate::service::{InventoryService, ReservationLine};

/// Consumes order and payment events and drives the reservation side of
/// the order saga. Reservation outcomes are reported back through the
/// outbox, never as consumer errors.
pub struct InventorySagaConsumer {
    service: Arc<InventoryService>,
    dedup: DedupGuard,
    outbox: OutboxWriter,
}

impl InventorySagaConsumer {
    pub fn new(service: Arc<InventoryService>, dedup: DedupGuard, outbox: OutboxWriter) -> Self {
        InventorySagaConsumer {
            service,
            dedup,
            outbox,
        }
    }

    async fn handle_order_created(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError> {
        let Some(order_id) = parse_order_id(envelope) else {
            warn!("order created event without a valid orderId, skipping");
            return Ok(());
        };
        let lines = parse_lines(envelope);
        if lines.is_empty() {
            warn!(order_id = %order_id, "order created event without reservable items");
            self.outbox
                .enqueue(
                    topics::INVENTORY_RESERVATION_FAILED,
                    &order_id.to_string(),
                    topics::INVENTORY_RESERVATION_FAILED,
                    json!({
                        "orderId": order_id.to_string(),
                        "reason": "no order items to reserve",
                    }),
                )
                .await
                .map_err(|err| ConsumerError::new(err.to_string()))?;
            return Ok(());
        }

        match self.service.reserve_for_order(&order_id, &lines).await {
            Ok(()) => {
                info!(order_id = %order_id, "order reserved");
                self.outbox
                    .enqueue(
                        topics::INVENTORY_RESERVED,
                        &order_id.to_string(),
                        topics::INVENTORY_RESERVED,
                        json!({ "orderId": order_id.to_string() }),
                    )
                    .await
                    .map_err(|err| ConsumerError::new(err.to_string()))?;
            }
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "order reservation failed");
                self.outbox
                    .enqueue(
                        topics::INVENTORY_RESERVATION_FAILED,
                        &order_id.to_string(),
                        topics::INVENTORY_RESERVATION_FAILED,
                        json!({
                            "orderId": order_id.to_string(),
                            "reason": err.to_string(),
                        }),
                    )
                    .await
                    .map_err(|err| ConsumerError::new(err.to_string()))?;
            }
        }
        Ok(())
    }

    async fn handle_order_settled(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), ConsumerError> {
        let Some(order_id) = parse_order_id(envelope) else {
            warn!(topic, "settlement event without a valid orderId, skipping");
            return Ok(());
        };
        let result = if topic == topics::PAYMENT_AUTHORIZED {
            self.service.confirm_for_order(&order_id).await
        } else {
            // Payment failure and order timeout both return the stock.
            self.service.release_for_order(&order_id).await
        };
        let transitioned = result.map_err(|err| ConsumerError::new(err.to_string()))?;
        info!(order_id = %order_id, topic, transitioned, "reservations settled");
        Ok(())
    }
}

#[async_trait]
impl EventConsumer for InventorySagaConsumer {
    fn group(&self) -> &'static str {
        "inventory-service"
    }

    fn topics(&self) -> &'static [&'static str] {
        &[
            topics::ORDER_CREATED,
            topics::ORDER_TIMED_OUT,
            topics::PAYMENT_AUTHORIZED,
            topics::PAYMENT_FAILED,
        ]
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

        match topic {
            topics::ORDER_CREATED => self.handle_order_created(&envelope).await,
            topics::ORDER_TIMED_OUT | topics::PAYMENT_AUTHORIZED | topics::PAYMENT_FAILED => {
                self.handle_order_settled(topic, &envelope).await
            }
            _ => Ok(()),
        }
    }
}

fn parse_order_id(envelope: &EventEnvelope) -> Option<OrderId> {
    let raw = envelope.payload_str("orderId")?;
    OrderId::parse(&raw).ok()
}

fn parse_lines(envelope: &EventEnvelope) -> Vec<ReservationLine> {
    let Some(items) = envelope.payload.get("items").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let sku = item.get("sku").and_then(|v| v.as_str())?;
            let quantity = item.get("quantity").and_then(|v| v.as_i64())?;
            if sku.trim().is_empty() || quantity <= 0 {
                return None;
            }
            Some(ReservationLine {
                sku: Sku::new(sku),
                quantity,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::InMemorySkuLock;
    use crate::memory::InMemoryInventoryStore;
    use common::{Clock, ManualClock};
    use outbox::{InMemoryDedupStore, InMemoryOutboxStore, OutboxStatus, OutboxStore};

    struct Fixture {
        consumer: InventorySagaConsumer,
        service: Arc<InventoryService>,
        outbox_store: Arc<InMemoryOutboxStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryInventoryStore::new());
        let lock = Arc::new(InMemorySkuLock::new(clock.clone()));
        let service = Arc::new(InventoryService::new(store, lock, clock.clone()));
        let outbox_store = Arc::new(InMemoryOutboxStore::new());
        let dedup = DedupGuard::new(Arc::new(InMemoryDedupStore::new()), clock.clone());
        let outbox = OutboxWriter::new(outbox_store.clone(), clock.clone(), "inventory-service");
        Fixture {
            consumer: InventorySagaConsumer::new(service.clone(), dedup, outbox),
            service,
            outbox_store,
            clock,
        }
    }

    fn order_created(clock: &dyn Clock, order_id: &OrderId, quantity: i64) -> String {
        EventEnvelope::new(
            topics::ORDER_CREATED,
            "order-service",
            json!({
                "orderId": order_id.to_string(),
                "items": [{"sku": "SKU-1", "quantity": quantity}],
            }),
            clock,
        )
        .to_json()
        .unwrap()
    }

    async fn pending_types(store: &InMemoryOutboxStore) -> Vec<String> {
        store
            .fetch_by_status(OutboxStatus::Pending, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[tokio::test]
    async fn order_created_reserves_and_reports_success() {
        let fx = fixture();
        let sku = Sku::new("SKU-1");
        fx.service.upsert_stock(&sku, 10).await.unwrap();
        let order_id = OrderId::new();

        let raw = order_created(fx.clock.as_ref(), &order_id, 3);
        fx.consumer
            .handle(topics::ORDER_CREATED, &raw)
            .await
            .unwrap();

        let view = fx.service.get_stock(&sku).await.unwrap();
        assert_eq!(view.reserved, 3);
        assert_eq!(
            pending_types(&fx.outbox_store).await,
            vec![topics::INVENTORY_RESERVED.to_string()]
        );
    }

    #[tokio::test]
    async fn shortfall_reports_reservation_failed() {
        let fx = fixture();
        fx.service
            .upsert_stock(&Sku::new("SKU-1"), 1)
            .await
            .unwrap();
        let order_id = OrderId::new();

        let raw = order_created(fx.clock.as_ref(), &order_id, 5);
        fx.consumer
            .handle(topics::ORDER_CREATED, &raw)
            .await
            .unwrap();

        assert_eq!(
            pending_types(&fx.outbox_store).await,
            vec![topics::INVENTORY_RESERVATION_FAILED.to_string()]
        );
    }

    #[tokio::test]
    async fn order_without_items_reports_reservation_failed() {
        let fx = fixture();
        let order_id = OrderId::new();

        for payload in [
            json!({"orderId": order_id.to_string(), "items": []}),
            json!({"orderId": OrderId::new().to_string()}),
            json!({"orderId": OrderId::new().to_string(), "items": [{"sku": " ", "quantity": 0}]}),
        ] {
            let raw = EventEnvelope::new(
                topics::ORDER_CREATED,
                "order-service",
                payload,
                fx.clock.as_ref(),
            )
            .to_json()
            .unwrap();
            fx.consumer
                .handle(topics::ORDER_CREATED, &raw)
                .await
                .unwrap();
        }

        assert_eq!(
            pending_types(&fx.outbox_store).await,
            vec![topics::INVENTORY_RESERVATION_FAILED.to_string(); 3]
        );
    }

    #[tokio::test]
    async fn duplicate_delivery_is_consumed_once() {
        let fx = fixture();
        let sku = Sku::new("SKU-1");
        fx.service.upsert_stock(&sku, 10).await.unwrap();
        let order_id = OrderId::new();

        let raw = order_created(fx.clock.as_ref(), &order_id, 3);
        fx.consumer
            .handle(topics::ORDER_CREATED, &raw)
            .await
            .unwrap();
        fx.consumer
            .handle(topics::ORDER_CREATED, &raw)
            .await
            .unwrap();

        let view = fx.service.get_stock(&sku).await.unwrap();
        assert_eq!(view.reserved, 3);
        // Only one reserved event, not two.
        assert_eq!(pending_types(&fx.outbox_store).await.len(), 1);
    }

    #[tokio::test]
    async fn payment_results_settle_reservations() {
        let fx = fixture();
        let sku = Sku::new("SKU-1");
        fx.service.upsert_stock(&sku, 10).await.unwrap();
        let authorized = OrderId::new();
        let failed = OrderId::new();
        for order_id in [&authorized, &failed] {
            let raw = order_created(fx.clock.as_ref(), order_id, 2);
            fx.consumer
                .handle(topics::ORDER_CREATED, &raw)
                .await
                .unwrap();
        }

        let authorized_event = EventEnvelope::new(
            topics::PAYMENT_AUTHORIZED,
            "payment-service",
            json!({"orderId": authorized.to_string()}),
            fx.clock.as_ref(),
        )
        .to_json()
        .unwrap();
        let failed_event = EventEnvelope::new(
            topics::PAYMENT_FAILED,
            "payment-service",
            json!({"orderId": failed.to_string()}),
            fx.clock.as_ref(),
        )
        .to_json()
        .unwrap();

        fx.consumer
            .handle(topics::PAYMENT_AUTHORIZED, &authorized_event)
            .await
            .unwrap();
        fx.consumer
            .handle(topics::PAYMENT_FAILED, &failed_event)
            .await
            .unwrap();

        let view = fx.service.get_stock(&sku).await.unwrap();
        // Authorized order's units are sold, failed order's returned.
        assert_eq!(view.available, 8);
        assert_eq!(view.reserved, 0);
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let fx = fixture();
        fx.consumer
            .handle(topics::ORDER_CREATED, "not json")
            .await
            .unwrap();
        fx.consumer.handle(topics::ORDER_CREATED, "").await.unwrap();
        assert!(pending_types(&fx.outbox_store).await.is_empty());
    }
}

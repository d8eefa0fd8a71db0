use std::sync::Arc;
use std::time::Duration;

use common::{Clock, Money, OrderId, UserId};
use metrics::counter;
use outbox::OutboxWriter;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{OrderError, Result};
use crate::record::{NewOrderItem, Order, OrderItem, OrderStatus};
use crate::store::OrderStore;

/// How long an order may sit in `PaymentPending` before the timeout
/// sweep cancels it.
pub const PAYMENT_DEADLINE: Duration = Duration::from_secs(15 * 60);

/// Upper bound on orders cancelled per timeout sweep.
pub const TIMEOUT_BATCH: usize = 100;

/// Order lifecycle operations.
///
/// Status changes go through compare-and-set transitions so concurrent
/// writers (payment consumer, timeout sweep, admin cancel) cannot both
/// win; the loser observes `false` and treats the order as settled.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    outbox: OutboxWriter,
    clock: Arc<dyn Clock>,
    payment_deadline: Duration,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, outbox: OutboxWriter, clock: Arc<dyn Clock>) -> Self {
        OrderService {
            store,
            outbox,
            clock,
            payment_deadline: PAYMENT_DEADLINE,
        }
    }

    /// Overrides the payment deadline, mainly for tests.
    pub fn with_payment_deadline(mut self, deadline: Duration) -> Self {
        self.payment_deadline = deadline;
        self
    }

    /// Records a new order and emits `order.created.v1` through the
    /// outbox, then parks the order in `PaymentPending`. No stock is
    /// reserved and no payment is taken here; downstream services react
    /// to the event.
    #[tracing::instrument(skip(self, items))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        currency: &str,
        items: Vec<NewOrderItem>,
    ) -> Result<Order> {
        let currency = normalize_currency(currency)?;
        if items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        let items: Vec<OrderItem> = items
            .into_iter()
            .map(|item| {
                if item.sku.is_blank() {
                    return Err(OrderError::InvalidItem("blank SKU".to_string()));
                }
                if item.quantity <= 0 {
                    return Err(OrderError::InvalidItem(format!(
                        "non-positive quantity for {}",
                        item.sku
                    )));
                }
                if !item.unit_price.is_positive() {
                    return Err(OrderError::InvalidItem(format!(
                        "non-positive unit price for {}",
                        item.sku
                    )));
                }
                Ok(OrderItem {
                    product_id: item.product_id,
                    sku: item.sku,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
            })
            .collect::<Result<_>>()?;

        let now = self.clock.now();
        let total_amount: Money = items.iter().map(OrderItem::line_total).sum();
        let mut order = Order {
            id: OrderId::new(),
            user_id,
            currency,
            total_amount,
            status: OrderStatus::Created,
            items,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&order).await?;

        self.outbox
            .enqueue(
                messaging::topics::ORDER_CREATED,
                &order.id.to_string(),
                messaging::topics::ORDER_CREATED,
                order_created_payload(&order),
            )
            .await?;

        // The outbox row exists; the saga is now in flight.
        self.store
            .transition(
                &order.id,
                OrderStatus::Created,
                OrderStatus::PaymentPending,
                now,
            )
            .await?;
        order.status = OrderStatus::PaymentPending;

        counter!("orders_created_total").increment(1);
        info!(order_id = %order.id, total = %order.total_amount, "order created");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order> {
        self.store
            .get(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(*order_id))
    }

    pub async fn list_orders(&self, user_id: Option<UserId>, limit: usize) -> Result<Vec<Order>> {
        self.store.list(user_id, limit).await
    }

    /// Caller-initiated cancellation. Rejected once the order has
    /// settled either way.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Err(OrderError::InvalidState {
                order_id: *order_id,
                status: order.status,
                action: "cancelled",
            });
        }
        self.store
            .transition(order_id, order.status, OrderStatus::Cancelled, self.clock.now())
            .await?;
        counter!("orders_cancelled_total").increment(1);
        info!(order_id = %order_id, "order cancelled");
        self.get_order(order_id).await
    }

    /// Operator confirmation, bypassing payment. Only valid while the
    /// order is still live.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_order(&self, order_id: &OrderId) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if !matches!(
            order.status,
            OrderStatus::Created | OrderStatus::PaymentPending
        ) {
            return Err(OrderError::InvalidState {
                order_id: *order_id,
                status: order.status,
                action: "confirmed",
            });
        }
        self.store
            .transition(order_id, order.status, OrderStatus::Confirmed, self.clock.now())
            .await?;
        info!(order_id = %order_id, "order confirmed");
        self.get_order(order_id).await
    }

    /// Applies a successful payment. A no-op when the order is already
    /// terminal, so redelivered payment events are harmless.
    #[tracing::instrument(skip(self))]
    pub async fn mark_payment_authorized(&self, order_id: &OrderId) -> Result<()> {
        let order = self.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Ok(());
        }
        if self
            .store
            .transition(order_id, order.status, OrderStatus::Confirmed, self.clock.now())
            .await?
        {
            counter!("orders_confirmed_total").increment(1);
            info!(order_id = %order_id, "order confirmed by payment");
        }
        Ok(())
    }

    /// Applies a failed payment or failed reservation by cancelling the
    /// order. A no-op when the order is already terminal.
    #[tracing::instrument(skip(self))]
    pub async fn mark_payment_failed(&self, order_id: &OrderId) -> Result<()> {
        let order = self.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Ok(());
        }
        if self
            .store
            .transition(order_id, order.status, OrderStatus::Cancelled, self.clock.now())
            .await?
        {
            counter!("orders_cancelled_total").increment(1);
            info!(order_id = %order_id, "order cancelled by payment failure");
        }
        Ok(())
    }

    /// Cancels orders stuck in `PaymentPending` past the deadline,
    /// oldest first, at most [`TIMEOUT_BATCH`] per sweep. Each timed-out
    /// order emits `order.timed-out.v1` exactly once: the compare-and-set
    /// loses if payment settled between the query and the update.
    #[tracing::instrument(skip(self))]
    pub async fn mark_timed_out_orders(&self) -> Result<usize> {
        let now = self.clock.now();
        let deadline = chrono::Duration::from_std(self.payment_deadline)
            .unwrap_or(chrono::Duration::minutes(15));
        let stale = self
            .store
            .find_by_status_updated_before(
                OrderStatus::PaymentPending,
                now - deadline,
                TIMEOUT_BATCH,
            )
            .await?;

        let mut cancelled = 0;
        for order in stale {
            let won = self
                .store
                .transition(
                    &order.id,
                    OrderStatus::PaymentPending,
                    OrderStatus::Cancelled,
                    now,
                )
                .await?;
            if !won {
                continue;
            }
            cancelled += 1;
            self.outbox
                .enqueue(
                    messaging::topics::ORDER_TIMED_OUT,
                    &order.id.to_string(),
                    messaging::topics::ORDER_TIMED_OUT,
                    json!({
                        "orderId": order.id.to_string(),
                        "reason": "payment deadline exceeded",
                    }),
                )
                .await?;
            warn!(order_id = %order.id, "order timed out waiting for payment");
        }
        if cancelled > 0 {
            counter!("orders_timed_out_total").increment(cancelled as u64);
        }
        Ok(cancelled)
    }
}

fn normalize_currency(currency: &str) -> Result<String> {
    let trimmed = currency.trim();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(OrderError::InvalidCurrency(currency.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

fn order_created_payload(order: &Order) -> serde_json::Value {
    json!({
        "orderId": order.id.to_string(),
        "userId": order.user_id.as_i64(),
        "currency": order.currency,
        "totalAmount": order.total_amount.cents(),
        "items": order
            .items
            .iter()
            .map(|item| {
                json!({
                    "productId": item.product_id,
                    "sku": item.sku.as_str(),
                    "quantity": item.quantity,
                    "unitPrice": item.unit_price.cents(),
                })
            })
            .collect::<Vec<_>>(),
    })
}

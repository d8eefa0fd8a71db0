use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::record::{Order, OrderStatus};
use crate::store::OrderStore;

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn list(&self, user_id: Option<UserId>, limit: usize) -> Result<Vec<Order>> {
        let mut rows: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| user_id.is_none_or(|user| o.user_id == user))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn transition(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_status_updated_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let mut rows: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.status == status && o.updated_at < cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|o| o.updated_at);
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{Money, Sku, UserId};

    fn order(status: OrderStatus, created_at: DateTime<Utc>) -> Order {
        Order {
            id: OrderId::new(),
            user_id: UserId::new(7),
            currency: "INR".to_string(),
            total_amount: Money::from_cents(1000),
            status,
            items: vec![crate::record::OrderItem {
                product_id: 1,
                sku: Sku::new("SKU-1"),
                quantity: 1,
                unit_price: Money::from_cents(1000),
            }],
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = InMemoryOrderStore::new();
        let row = order(OrderStatus::PaymentPending, Utc::now());
        store.insert(&row).await.unwrap();

        let now = Utc::now();
        assert!(
            store
                .transition(&row.id, OrderStatus::PaymentPending, OrderStatus::Cancelled, now)
                .await
                .unwrap()
        );
        // Second writer loses the race.
        assert!(
            !store
                .transition(&row.id, OrderStatus::PaymentPending, OrderStatus::Confirmed, now)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn stale_query_filters_status_and_age() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let stale = order(OrderStatus::PaymentPending, now - Duration::minutes(20));
        let fresh = order(OrderStatus::PaymentPending, now - Duration::minutes(1));
        let done = order(OrderStatus::Confirmed, now - Duration::minutes(20));
        // Created long ago but touched recently, so not stale.
        let mut touched = order(OrderStatus::PaymentPending, now - Duration::minutes(20));
        touched.updated_at = now - Duration::minutes(1);
        for row in [&stale, &fresh, &done, &touched] {
            store.insert(row).await.unwrap();
        }

        let rows = store
            .find_by_status_updated_before(
                OrderStatus::PaymentPending,
                now - Duration::minutes(15),
                100,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, stale.id);
    }

    #[tokio::test]
    async fn list_scopes_to_a_user_when_asked() {
        let store = InMemoryOrderStore::new();
        let mine = order(OrderStatus::Confirmed, Utc::now());
        let mut theirs = order(OrderStatus::Confirmed, Utc::now());
        theirs.user_id = UserId::new(8);
        store.insert(&mine).await.unwrap();
        store.insert(&theirs).await.unwrap();

        let all = store.list(None, 100).await.unwrap();
        assert_eq!(all.len(), 2);

        let scoped = store.list(Some(UserId::new(7)), 100).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, mine.id);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};

use crate::error::Result;
use crate::record::{Order, OrderStatus};

/// Persistence boundary for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>>;

    /// Most recent orders first, at most `limit`. A `user_id` narrows
    /// the listing to that user's orders.
    async fn list(&self, user_id: Option<UserId>, limit: usize) -> Result<Vec<Order>>;

    /// Compare-and-set status transition. Returns `true` only if the
    /// order was in `from` and is now in `to`; a `false` return means
    /// another writer got there first.
    async fn transition(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Orders sitting in `status` whose last transition happened strictly
    /// before `cutoff`, least recently touched first, at most `limit` rows.
    async fn find_by_status_updated_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Order>>;
}

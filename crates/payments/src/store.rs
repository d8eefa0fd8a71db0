use async_trait::async_trait;
use common::{OrderId, PaymentId};

use crate::error::Result;
use crate::record::{DeadLetterStatus, Payment, ProviderDeadLetter};

/// Persistence boundary for payment intents.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<()>;

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<Payment>>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>>;

    async fn find_by_provider_payment_id(&self, provider_id: &str) -> Result<Option<Payment>>;

    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<Payment>>;

    async fn update(&self, payment: &Payment) -> Result<()>;
}

/// Persistence boundary for provider dead letters. `insert` assigns and
/// returns the row id.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn insert(&self, dead_letter: &ProviderDeadLetter) -> Result<i64>;

    async fn get(&self, id: i64) -> Result<Option<ProviderDeadLetter>>;

    /// Newest first, optionally filtered by status, at most `limit`.
    async fn list(
        &self,
        status: Option<DeadLetterStatus>,
        limit: usize,
    ) -> Result<Vec<ProviderDeadLetter>>;

    async fn update(&self, dead_letter: &ProviderDeadLetter) -> Result<()>;
}

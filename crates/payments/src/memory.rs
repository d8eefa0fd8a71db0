use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use common::{OrderId, PaymentId};
use tokio::sync::RwLock;

use crate::error::{PaymentError, Result};
use crate::record::{DeadLetterStatus, Payment, ProviderDeadLetter};
use crate::store::{DeadLetterStore, PaymentStore};

/// In-memory payment store for tests and local development.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: RwLock<HashMap<PaymentId, Payment>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        self.payments
            .write()
            .await
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(payment_id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.idempotency_key == key)
            .cloned())
    }

    async fn find_by_provider_payment_id(&self, provider_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.provider_payment_id == provider_id)
            .cloned())
    }

    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.order_id == *order_id)
            .cloned())
    }

    async fn update(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if !payments.contains_key(&payment.id) {
            return Err(PaymentError::PaymentNotFound(payment.id));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }
}

/// In-memory dead-letter store with a sequence-assigned id.
#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    rows: RwLock<HashMap<i64, ProviderDeadLetter>>,
    next_id: AtomicI64,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn insert(&self, dead_letter: &ProviderDeadLetter) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut row = dead_letter.clone();
        row.id = id;
        self.rows.write().await.insert(id, row);
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<ProviderDeadLetter>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<DeadLetterStatus>,
        limit: usize,
    ) -> Result<Vec<ProviderDeadLetter>> {
        let mut rows: Vec<ProviderDeadLetter> = self
            .rows
            .read()
            .await
            .values()
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn update(&self, dead_letter: &ProviderDeadLetter) -> Result<()> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&dead_letter.id) {
            return Err(PaymentError::DeadLetterNotFound(dead_letter.id));
        }
        rows.insert(dead_letter.id, dead_letter.clone());
        Ok(())
    }
}

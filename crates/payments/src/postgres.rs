//! PostgreSQL-backed payment, dead-letter, and webhook-marker stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::Result;
use crate::record::{DeadLetterStatus, Payment, PaymentStatus, ProviderDeadLetter};
use crate::store::{DeadLetterStore, PaymentStore};

#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let status: String = row.try_get("status")?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            idempotency_key: row.try_get("idempotency_key")?,
            provider_payment_id: row.try_get("provider_payment_id")?,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            status: PaymentStatus::parse(&status)?,
            failure_reason: row.try_get("failure_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Payment>> {
        // Column names are compile-time constants, never user input.
        let query = format!(
            "SELECT id, order_id, user_id, idempotency_key, provider_payment_id, amount_cents, currency, status, failure_reason, created_at, updated_at \
             FROM payments WHERE {column} = $1"
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_payment).transpose()
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, order_id, user_id, idempotency_key, provider_payment_id, amount_cents, currency, status, failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_i64())
        .bind(&payment.idempotency_key)
        .bind(&payment.provider_payment_id)
        .bind(payment.amount.cents())
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.failure_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, user_id, idempotency_key, provider_payment_id, amount_cents, currency, status, failure_reason, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        self.find_one("idempotency_key", key).await
    }

    async fn find_by_provider_payment_id(&self, provider_id: &str) -> Result<Option<Payment>> {
        self.find_one("provider_payment_id", provider_id).await
    }

    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, user_id, idempotency_key, provider_payment_id, amount_cents, currency, status, failure_reason, created_at, updated_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_payment).transpose()
    }

    async fn update(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            "UPDATE payments SET status = $2, failure_reason = $3, updated_at = $4 WHERE id = $1",
        )
            .bind(payment.id.as_uuid())
            .bind(payment.status.as_str())
            .bind(&payment.failure_reason)
            .bind(payment.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PostgresDeadLetterStore {
    pool: PgPool,
}

impl PostgresDeadLetterStore {
    /// Creates a new PostgreSQL dead-letter store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_dead_letter(row: PgRow) -> Result<ProviderDeadLetter> {
        let status: String = row.try_get("status")?;
        Ok(ProviderDeadLetter {
            id: row.try_get("id")?,
            idempotency_key: row.try_get("idempotency_key")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            status: DeadLetterStatus::parse(&status)?,
            attempts: row.try_get("attempts")?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
            requeued_payment_id: row
                .try_get::<Option<Uuid>, _>("requeued_payment_id")?
                .map(PaymentId::from_uuid),
        })
    }
}

#[async_trait]
impl DeadLetterStore for PostgresDeadLetterStore {
    async fn insert(&self, dead_letter: &ProviderDeadLetter) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO provider_dead_letters
                (idempotency_key, order_id, user_id, amount_cents, currency, status, attempts, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&dead_letter.idempotency_key)
        .bind(dead_letter.order_id.as_uuid())
        .bind(dead_letter.user_id.as_i64())
        .bind(dead_letter.amount.cents())
        .bind(&dead_letter.currency)
        .bind(dead_letter.status.as_str())
        .bind(dead_letter.attempts)
        .bind(&dead_letter.reason)
        .bind(dead_letter.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<ProviderDeadLetter>> {
        let row = sqlx::query(
            r#"
            SELECT id, idempotency_key, order_id, user_id, amount_cents, currency, status, attempts, reason, created_at, resolved_at, requeued_payment_id
            FROM provider_dead_letters
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_dead_letter).transpose()
    }

    async fn list(
        &self,
        status: Option<DeadLetterStatus>,
        limit: usize,
    ) -> Result<Vec<ProviderDeadLetter>> {
        let rows = sqlx::query(
            r#"
            SELECT id, idempotency_key, order_id, user_id, amount_cents, currency, status, attempts, reason, created_at, resolved_at, requeued_payment_id
            FROM provider_dead_letters
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_dead_letter).collect()
    }

    async fn update(&self, dead_letter: &ProviderDeadLetter) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE provider_dead_letters
            SET status = $2, attempts = $3, reason = $4, resolved_at = $5, requeued_payment_id = $6
            WHERE id = $1
            "#,
        )
        .bind(dead_letter.id)
        .bind(dead_letter.status.as_str())
        .bind(dead_letter.attempts)
        .bind(&dead_letter.reason)
        .bind(dead_letter.resolved_at)
        .bind(dead_letter.requeued_payment_id.map(|id| id.as_uuid()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Webhook markers share the dedup-store contract with consumed events
/// but live in their own table keyed by provider event id.
#[derive(Clone)]
pub struct PostgresWebhookStore {
    pool: PgPool,
}

impl PostgresWebhookStore {
    /// Creates a new PostgreSQL webhook-marker store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl outbox::DedupStore for PostgresWebhookStore {
    async fn insert_if_absent(
        &self,
        event_id: &str,
        consumed_at: DateTime<Utc>,
    ) -> outbox::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (provider_event_id, consumed_at)
            VALUES ($1, $2)
            ON CONFLICT (provider_event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(consumed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_consumed_before(&self, cutoff: DateTime<Utc>) -> outbox::Result<u64> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE consumed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

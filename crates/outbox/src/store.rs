//! Storage contracts for outbox rows and consumed-event markers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::record::{OutboxEvent, OutboxStatus};

/// Storage for a service's outbox rows.
///
/// Implementations must treat `insert` as part of the caller's local
/// transactional scope where the backing store supports it, so a rolled-back
/// business write never leaves an orphaned event row.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends one row.
    async fn insert(&self, event: OutboxEvent) -> Result<()>;

    /// Persists status, attempts, last error, and `updated_at` for a row.
    async fn update(&self, event: &OutboxEvent) -> Result<()>;

    /// Up to `limit` rows in the given status, oldest `created_at` first.
    async fn fetch_by_status(&self, status: OutboxStatus, limit: usize)
    -> Result<Vec<OutboxEvent>>;

    /// Number of rows currently in the given status.
    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64>;

    /// Deletes rows in `status` whose `updated_at` is before `cutoff`.
    /// Returns the number of rows removed.
    async fn delete_by_status_before(
        &self,
        status: OutboxStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64>;
}

/// Storage for per-consumer processed-event markers.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Atomically inserts a marker for `event_id` unless one exists.
    /// Returns true if the marker was inserted (first sighting).
    async fn insert_if_absent(&self, event_id: &str, consumed_at: DateTime<Utc>) -> Result<bool>;

    /// Deletes markers consumed before `cutoff`. Returns the number removed.
    async fn delete_consumed_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

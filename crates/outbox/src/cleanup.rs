//! Retention cleanup for delivered outbox rows and dedup markers.

use std::sync::Arc;

use chrono::Duration;
use common::Clock;

use crate::error::Result;
use crate::record::OutboxStatus;
use crate::store::{DedupStore, OutboxStore};

/// Retention windows for reliability data.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    /// How long `SENT` rows are kept.
    pub sent: Duration,
    /// How long `FAILED` rows are kept before giving up on replay.
    pub failed: Duration,
    /// How long consumed-event markers are kept. Must exceed the broker's
    /// redelivery horizon or dedup silently stops working for old events.
    pub dedup: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sent: Duration::days(7),
            failed: Duration::days(30),
            dedup: Duration::days(14),
        }
    }
}

/// Counts of rows removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub sent_outbox: u64,
    pub failed_outbox: u64,
    pub dedup_markers: u64,
}

impl CleanupReport {
    /// Total rows removed.
    pub fn total(&self) -> u64 {
        self.sent_outbox + self.failed_outbox + self.dedup_markers
    }
}

/// Periodic purge of reliability data past its retention window.
#[derive(Clone)]
pub struct RetentionCleanup {
    outbox: Arc<dyn OutboxStore>,
    dedup: Arc<dyn DedupStore>,
    clock: Arc<dyn Clock>,
    config: RetentionConfig,
}

impl RetentionCleanup {
    /// Creates a cleanup task over one service's stores.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        dedup: Arc<dyn DedupStore>,
        clock: Arc<dyn Clock>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            outbox,
            dedup,
            clock,
            config,
        }
    }

    /// Runs one cleanup pass.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<CleanupReport> {
        let now = self.clock.now();
        let report = CleanupReport {
            sent_outbox: self
                .outbox
                .delete_by_status_before(OutboxStatus::Sent, now - self.config.sent)
                .await?,
            failed_outbox: self
                .outbox
                .delete_by_status_before(OutboxStatus::Failed, now - self.config.failed)
                .await?,
            dedup_markers: self.dedup.delete_consumed_before(now - self.config.dedup).await?,
        };

        if report.total() > 0 {
            tracing::info!(
                sent = report.sent_outbox,
                failed = report.failed_outbox,
                dedup = report.dedup_markers,
                "cleanup removed reliability records"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDedupStore, InMemoryOutboxStore};
    use crate::record::OutboxEvent;
    use crate::store::{DedupStore, OutboxStore};
    use chrono::Utc;
    use common::{EventId, ManualClock};

    fn row(status: OutboxStatus, age: Duration, now: chrono::DateTime<Utc>) -> OutboxEvent {
        let at = now - age;
        OutboxEvent {
            id: EventId::new(),
            topic: "t".to_string(),
            message_key: "k".to_string(),
            event_type: "t.v1".to_string(),
            payload: "{}".to_string(),
            status,
            attempts: 0,
            last_error: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn cleanup_applies_per_class_retention() {
        let outbox = Arc::new(InMemoryOutboxStore::new());
        let dedup = Arc::new(InMemoryDedupStore::new());
        let clock = Arc::new(ManualClock::default());
        let now = clock.now();

        // Past retention: sent > 7d, failed > 30d, marker > 14d.
        outbox
            .insert(row(OutboxStatus::Sent, Duration::days(8), now))
            .await
            .unwrap();
        outbox
            .insert(row(OutboxStatus::Failed, Duration::days(31), now))
            .await
            .unwrap();
        dedup
            .insert_if_absent("old", now - Duration::days(15))
            .await
            .unwrap();

        // Within retention.
        outbox
            .insert(row(OutboxStatus::Sent, Duration::days(2), now))
            .await
            .unwrap();
        outbox
            .insert(row(OutboxStatus::Failed, Duration::days(2), now))
            .await
            .unwrap();
        dedup.insert_if_absent("fresh", now).await.unwrap();

        let cleanup = RetentionCleanup::new(
            outbox.clone(),
            dedup.clone(),
            clock,
            RetentionConfig::default(),
        );
        let report = cleanup.run().await.unwrap();

        assert_eq!(
            report,
            CleanupReport {
                sent_outbox: 1,
                failed_outbox: 1,
                dedup_markers: 1,
            }
        );
        assert_eq!(outbox.row_count().await, 2);
        assert_eq!(dedup.marker_count().await, 1);

        // Re-running with nothing eligible is a no-op.
        assert_eq!(cleanup.run().await.unwrap().total(), 0);
    }
}

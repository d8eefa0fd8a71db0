//! Outbox publisher: drains pending rows to the broker with bounded retry.

use std::sync::Arc;

use common::Clock;
use messaging::MessageSender;
use messaging::broker::SEND_TIMEOUT;

use crate::error::Result;
use crate::record::{OutboxEvent, OutboxStatus};
use crate::store::OutboxStore;

/// Maximum stored length of a delivery error message.
const LAST_ERROR_LIMIT: usize = 500;

/// Bounded-retry policy for outbox delivery.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after which a row is quarantined as `FAILED`.
    pub max_retry: i32,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt ceiling (minimum 1).
    pub fn new(max_retry: i32) -> Self {
        Self {
            max_retry: max_retry.max(1),
        }
    }

    /// Classifies a delivery attempt.
    pub fn classify(&self, send_result: std::result::Result<(), String>, attempts_so_far: i32) -> PublishOutcome {
        match send_result {
            Ok(()) => PublishOutcome::Delivered,
            Err(reason) if attempts_so_far + 1 >= self.max_retry => PublishOutcome::Exhausted(reason),
            Err(reason) => PublishOutcome::TransientFailure(reason),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retry: 5 }
    }
}

/// Outcome of one delivery attempt for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Acked by the broker; the row becomes `SENT`.
    Delivered,
    /// Failed with attempts remaining; the row stays `PENDING`.
    TransientFailure(String),
    /// Failed with attempts exhausted; the row becomes `FAILED` and waits
    /// for an administrative replay.
    Exhausted(String),
}

/// Drains one service's outbox to the broker.
///
/// Safe to run from multiple instances concurrently: a row racing between
/// publishers can be sent twice, which downstream dedup absorbs.
/// At-least-once delivery is the committed guarantee, not exactly-once.
#[derive(Clone)]
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    sender: Arc<dyn MessageSender>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl OutboxPublisher {
    /// Creates a publisher with the default batch size of 100.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        sender: Arc<dyn MessageSender>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            sender,
            clock,
            policy,
            batch_size: 100,
        }
    }

    /// Overrides the per-pass batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Selects one bounded batch of `PENDING` rows (oldest first) and
    /// attempts delivery for each. Returns the number delivered.
    #[tracing::instrument(skip(self))]
    pub async fn publish_pending(&self) -> Result<usize> {
        let pending = self
            .store
            .fetch_by_status(OutboxStatus::Pending, self.batch_size)
            .await?;

        let mut delivered = 0;
        for mut event in pending {
            let send_result = self.send_bounded(&event).await;
            match self.policy.classify(send_result, event.attempts) {
                PublishOutcome::Delivered => {
                    event.status = OutboxStatus::Sent;
                    event.last_error = None;
                    metrics::counter!("outbox_published_total").increment(1);
                    delivered += 1;
                }
                PublishOutcome::TransientFailure(reason) => {
                    event.attempts += 1;
                    event.last_error = Some(trim_error(&reason));
                    metrics::counter!("outbox_publish_retries_total").increment(1);
                    tracing::warn!(
                        event_id = %event.id,
                        topic = %event.topic,
                        attempts = event.attempts,
                        "outbox delivery failed, will retry"
                    );
                }
                PublishOutcome::Exhausted(reason) => {
                    event.attempts += 1;
                    event.status = OutboxStatus::Failed;
                    event.last_error = Some(trim_error(&reason));
                    metrics::counter!("outbox_publish_failed_total").increment(1);
                    tracing::error!(
                        event_id = %event.id,
                        topic = %event.topic,
                        attempts = event.attempts,
                        "outbox delivery exhausted retries, row quarantined"
                    );
                }
            }
            event.updated_at = self.clock.now();
            self.store.update(&event).await?;
        }

        Ok(delivered)
    }

    /// Administrative replay: resets one bounded batch of `FAILED` rows to
    /// `PENDING` with the error cleared. Returns the number reset.
    #[tracing::instrument(skip(self))]
    pub async fn replay_failed(&self) -> Result<usize> {
        let failed = self
            .store
            .fetch_by_status(OutboxStatus::Failed, self.batch_size)
            .await?;

        let mut replayed = 0;
        for mut event in failed {
            event.status = OutboxStatus::Pending;
            event.last_error = None;
            event.updated_at = self.clock.now();
            self.store.update(&event).await?;
            metrics::counter!("outbox_replayed_total").increment(1);
            replayed += 1;
        }

        if replayed > 0 {
            tracing::info!(replayed, "replayed failed outbox rows");
        }
        Ok(replayed)
    }

    async fn send_bounded(&self, event: &OutboxEvent) -> std::result::Result<(), String> {
        let send = self
            .sender
            .send(&event.topic, &event.message_key, &event.payload);
        match tokio::time::timeout(SEND_TIMEOUT, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!("broker send timed out after {SEND_TIMEOUT:?}")),
        }
    }
}

fn trim_error(reason: &str) -> String {
    if reason.len() <= LAST_ERROR_LIMIT {
        reason.to_string()
    } else {
        let mut end = LAST_ERROR_LIMIT;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOutboxStore;
    use crate::writer::OutboxWriter;
    use common::SystemClock;
    use messaging::InMemoryBroker;
    use serde_json::json;

    fn setup() -> (Arc<InMemoryOutboxStore>, Arc<InMemoryBroker>, OutboxWriter, OutboxPublisher) {
        let store = Arc::new(InMemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let clock = Arc::new(SystemClock);
        let writer = OutboxWriter::new(store.clone(), clock.clone(), "order-service");
        let publisher = OutboxPublisher::new(
            store.clone(),
            broker.clone(),
            clock,
            RetryPolicy::new(3),
        );
        (store, broker, writer, publisher)
    }

    #[tokio::test]
    async fn pending_rows_are_delivered_and_marked_sent() {
        let (store, broker, writer, publisher) = setup();
        let id = writer
            .enqueue("order.created.v1", "o-1", "order.created.v1", json!({}))
            .await
            .unwrap();

        let delivered = publisher.publish_pending().await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(broker.messages_for("order.created.v1").len(), 1);

        let row = store.find(id).await.unwrap();
        assert_eq!(row.status, OutboxStatus::Sent);
        assert!(row.last_error.is_none());

        // A sent row is never picked up again.
        assert_eq!(publisher.publish_pending().await.unwrap(), 0);
        assert_eq!(broker.sent_count(), 1);
    }

    #[tokio::test]
    async fn transient_failures_keep_row_pending_until_exhausted() {
        let (store, broker, writer, publisher) = setup();
        broker.set_fail_on_send(true);
        let id = writer.enqueue("t", "k", "t", json!({})).await.unwrap();

        // Attempts 1 and 2: still pending.
        for expected_attempts in 1..=2 {
            assert_eq!(publisher.publish_pending().await.unwrap(), 0);
            let row = store.find(id).await.unwrap();
            assert_eq!(row.status, OutboxStatus::Pending);
            assert_eq!(row.attempts, expected_attempts);
            assert!(row.last_error.is_some());
        }

        // Attempt 3 exhausts the policy.
        assert_eq!(publisher.publish_pending().await.unwrap(), 0);
        let row = store.find(id).await.unwrap();
        assert_eq!(row.status, OutboxStatus::Failed);
        assert_eq!(row.attempts, 3);

        // Failed rows are quarantined, not silently retried.
        assert_eq!(publisher.publish_pending().await.unwrap(), 0);
        assert_eq!(store.find(id).await.unwrap().attempts, 3);
    }

    #[tokio::test]
    async fn replay_resets_failed_rows_to_pending() {
        let (store, broker, writer, publisher) = setup();
        broker.set_fail_on_send(true);
        let id = writer.enqueue("t", "k", "t", json!({})).await.unwrap();
        for _ in 0..3 {
            publisher.publish_pending().await.unwrap();
        }
        assert_eq!(store.find(id).await.unwrap().status, OutboxStatus::Failed);

        let replayed = publisher.replay_failed().await.unwrap();
        assert_eq!(replayed, 1);
        let row = store.find(id).await.unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert!(row.last_error.is_none());

        // With the broker healthy again the replayed row goes out.
        broker.set_fail_on_send(false);
        assert_eq!(publisher.publish_pending().await.unwrap(), 1);
        assert_eq!(store.find(id).await.unwrap().status, OutboxStatus::Sent);
    }

    #[tokio::test]
    async fn batch_size_bounds_each_pass() {
        let (_, broker, writer, publisher) = setup();
        let publisher = publisher.with_batch_size(2);
        for i in 0..5 {
            writer
                .enqueue("t", &format!("k-{i}"), "t", json!({}))
                .await
                .unwrap();
        }

        assert_eq!(publisher.publish_pending().await.unwrap(), 2);
        assert_eq!(publisher.publish_pending().await.unwrap(), 2);
        assert_eq!(publisher.publish_pending().await.unwrap(), 1);
        assert_eq!(broker.sent_count(), 5);
    }

    #[test]
    fn retry_policy_classification() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.classify(Ok(()), 0), PublishOutcome::Delivered);
        assert_eq!(
            policy.classify(Err("x".to_string()), 0),
            PublishOutcome::TransientFailure("x".to_string())
        );
        assert_eq!(
            policy.classify(Err("x".to_string()), 2),
            PublishOutcome::Exhausted("x".to_string())
        );
    }

    #[test]
    fn error_messages_are_trimmed() {
        let long = "e".repeat(2000);
        assert_eq!(trim_error(&long).len(), 500);
        assert_eq!(trim_error("short"), "short");
    }
}

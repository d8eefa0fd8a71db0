//! Outbox writer: the producer-side half of the outbox pattern.

use std::sync::Arc;

use common::{Clock, EventId};
use messaging::EventEnvelope;

use crate::error::Result;
use crate::record::{OutboxEvent, OutboxStatus};
use crate::store::OutboxStore;

/// Appends outbox rows on behalf of one producing service.
///
/// `enqueue` must be called from within the caller's business operation so
/// the row shares its local transactional scope: if the business write rolls
/// back, the event never exists.
#[derive(Clone)]
pub struct OutboxWriter {
    store: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
    producer: String,
}

impl OutboxWriter {
    /// Creates a writer that stamps `producer` on every envelope.
    pub fn new(store: Arc<dyn OutboxStore>, clock: Arc<dyn Clock>, producer: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            producer: producer.into(),
        }
    }

    /// Wraps `payload` in a fresh envelope and appends one `PENDING` row.
    /// Returns the event id assigned to the row.
    #[tracing::instrument(skip(self, payload), fields(producer = %self.producer))]
    pub async fn enqueue(
        &self,
        topic: &str,
        message_key: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<EventId> {
        let envelope = EventEnvelope::new(event_type, self.producer.clone(), payload, self.clock.as_ref());
        let now = self.clock.now();

        let event = OutboxEvent {
            id: envelope.event_id,
            topic: topic.to_string(),
            message_key: message_key.to_string(),
            event_type: event_type.to_string(),
            payload: envelope.to_json()?,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let event_id = event.id;

        self.store.insert(event).await?;
        metrics::counter!("outbox_enqueued_total").increment(1);
        Ok(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOutboxStore;
    use common::SystemClock;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_appends_pending_envelope_row() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let writer = OutboxWriter::new(store.clone(), Arc::new(SystemClock), "order-service");

        let event_id = writer
            .enqueue(
                "order.created.v1",
                "order-1",
                "order.created.v1",
                json!({"orderId": "order-1"}),
            )
            .await
            .unwrap();

        let row = store.find(event_id).await.unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.attempts, 0);
        assert_eq!(row.message_key, "order-1");

        let envelope = EventEnvelope::parse(&row.payload).unwrap();
        assert_eq!(envelope.event_id, event_id);
        assert_eq!(envelope.producer, "order-service");
        assert_eq!(envelope.payload_str("orderId").as_deref(), Some("order-1"));
    }

    #[tokio::test]
    async fn enqueue_assigns_distinct_event_ids() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let writer = OutboxWriter::new(store.clone(), Arc::new(SystemClock), "order-service");

        let a = writer.enqueue("t", "k", "t", json!({})).await.unwrap();
        let b = writer.enqueue("t", "k", "t", json!({})).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.row_count().await, 2);
    }
}

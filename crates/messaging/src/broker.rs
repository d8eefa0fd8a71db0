//! Broker send primitive and in-memory implementation.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the broker send path. All of these are transient from the
/// caller's perspective; the outbox publisher turns them into bounded
/// retries, never into lost events.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The broker rejected or dropped the message.
    #[error("broker send failed: {0}")]
    SendFailed(String),

    /// The broker did not acknowledge within the bounded wait.
    #[error("broker send timed out after {0:?}")]
    Timeout(Duration),
}

/// A message handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

/// Fire-and-confirm send primitive with a bounded wait.
///
/// Implementations must not block indefinitely; a send either succeeds,
/// fails, or times out within `SEND_TIMEOUT`.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends one message, waiting at most [`SEND_TIMEOUT`] for the ack.
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), MessagingError>;
}

/// Bounded wait for a single broker ack.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct InMemoryBrokerState {
    log: Vec<BrokerMessage>,
    pending: VecDeque<BrokerMessage>,
    fail_on_send: bool,
}

/// In-memory broker for single-process wiring and tests.
///
/// Sends append to both a permanent log (for assertions) and a pending queue
/// that a dispatch loop drains toward registered consumers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<InMemoryBrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the broker to fail every send until reset.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the total number of accepted messages.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().log.len()
    }

    /// Returns every accepted message for a topic, in send order.
    pub fn messages_for(&self, topic: &str) -> Vec<BrokerMessage> {
        self.state
            .read()
            .unwrap()
            .log
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Removes and returns all undelivered messages.
    pub fn drain_pending(&self) -> Vec<BrokerMessage> {
        self.state.write().unwrap().pending.drain(..).collect()
    }
}

#[async_trait]
impl MessageSender for InMemoryBroker {
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), MessagingError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(MessagingError::SendFailed("broker unreachable".to_string()));
        }
        let message = BrokerMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        };
        state.log.push(message.clone());
        state.pending.push_back(message);
        metrics::counter!("broker_messages_accepted_total").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_records_and_queues() {
        let broker = InMemoryBroker::new();
        broker.send("t1", "k1", "p1").await.unwrap();
        broker.send("t2", "k2", "p2").await.unwrap();

        assert_eq!(broker.sent_count(), 2);
        assert_eq!(broker.messages_for("t1").len(), 1);

        let pending = broker.drain_pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].key, "k1");

        // Draining consumes the queue but keeps the log.
        assert!(broker.drain_pending().is_empty());
        assert_eq!(broker.sent_count(), 2);
    }

    #[tokio::test]
    async fn send_fails_when_toggled() {
        let broker = InMemoryBroker::new();
        broker.set_fail_on_send(true);
        let result = broker.send("t", "k", "p").await;
        assert!(matches!(result, Err(MessagingError::SendFailed(_))));
        assert_eq!(broker.sent_count(), 0);

        broker.set_fail_on_send(false);
        broker.send("t", "k", "p").await.unwrap();
        assert_eq!(broker.sent_count(), 1);
    }
}

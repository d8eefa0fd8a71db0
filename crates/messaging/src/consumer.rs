//! Consumer registration and dispatch.
//!
//! Consumers receive raw broker payloads and must tolerate duplicates,
//! out-of-order delivery, and malformed input. A handler error is an
//! operational-visibility concern: the dispatcher logs it and moves on.

use async_trait::async_trait;
use thiserror::Error;

use crate::broker::BrokerMessage;

/// Error surfaced by a consumer when an infrastructure dependency failed.
/// Business outcomes (e.g. reservation failed) are not errors here; consumers
/// report those through their own outbox events.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConsumerError(pub String);

impl ConsumerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A subscriber to one or more topics.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Consumer group name, used for logging.
    fn group(&self) -> &'static str;

    /// Topics this consumer subscribes to.
    fn topics(&self) -> &'static [&'static str];

    /// Handles one raw delivery from a subscribed topic.
    async fn handle(&self, topic: &str, raw: &str) -> Result<(), ConsumerError>;
}

/// Routes broker messages to every consumer subscribed to their topic.
#[derive(Default)]
pub struct Dispatcher {
    consumers: Vec<std::sync::Arc<dyn EventConsumer>>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer.
    pub fn register(&mut self, consumer: std::sync::Arc<dyn EventConsumer>) {
        self.consumers.push(consumer);
    }

    /// Returns the number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Delivers one message to all subscribed consumers.
    ///
    /// Handler failures are logged and counted, never propagated: a poison
    /// message must not stall the consumption loop.
    pub async fn dispatch(&self, message: &BrokerMessage) {
        for consumer in &self.consumers {
            if !consumer.topics().contains(&message.topic.as_str()) {
                continue;
            }
            if let Err(err) = consumer.handle(&message.topic, &message.payload).await {
                metrics::counter!("consumer_handle_failures_total").increment(1);
                tracing::warn!(
                    group = consumer.group(),
                    topic = %message.topic,
                    key = %message.key,
                    error = %err,
                    "consumer failed to handle delivery"
                );
            }
        }
    }

    /// Delivers a batch of messages in order.
    pub async fn dispatch_all(&self, messages: &[BrokerMessage]) {
        for message in messages {
            self.dispatch(message).await;
        }
    }
}

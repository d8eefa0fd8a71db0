//! Event envelope, topic names, and the broker send primitive.
//!
//! Delivery is at-least-once end to end: the outbox publisher may send a row
//! more than once and the broker may redeliver, so every consumer built on
//! this crate deduplicates by event id before applying business effects.

pub mod broker;
pub mod consumer;
pub mod envelope;
pub mod topics;

pub use broker::{BrokerMessage, InMemoryBroker, MessageSender, MessagingError};
pub use consumer::{ConsumerError, Dispatcher, EventConsumer};
pub use envelope::EventEnvelope;

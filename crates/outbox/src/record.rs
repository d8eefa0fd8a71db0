//! Outbox row and consumed-event marker shapes.
//!
//! Every producing service carries the same row shape, parameterized over
//! the underlying storage through [`crate::store::OutboxStore`].

use chrono::{DateTime, Utc};
use common::EventId;

use crate::error::OutboxError;

/// Delivery status of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxStatus {
    /// Waiting for the publisher, or waiting for another bounded retry.
    Pending,
    /// Delivered to the broker; never re-sent from this row.
    Sent,
    /// Retries exhausted; terminal until an explicit replay resets it.
    Failed,
}

impl OutboxStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Result<Self, OutboxError> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "SENT" => Ok(OutboxStatus::Sent),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(OutboxError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event row in a producing service's outbox.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    /// Event id; also the envelope's `eventId` and the consumer dedup key.
    pub id: EventId,
    /// Destination topic.
    pub topic: String,
    /// Partition key (typically the order id).
    pub message_key: String,
    /// Versioned event type.
    pub event_type: String,
    /// Serialized [`messaging::EventEnvelope`].
    pub payload: String,
    /// Delivery status.
    pub status: OutboxStatus,
    /// Delivery attempts so far.
    pub attempts: i32,
    /// Truncated message from the most recent failed attempt.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Marker recording that a consumer already applied an event.
#[derive(Debug, Clone)]
pub struct ConsumedEventMarker {
    pub event_id: String,
    pub consumed_at: DateTime<Utc>,
}

//! Versioned event envelope shared by all services.

use chrono::{DateTime, Utc};
use common::{Clock, EventId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every event published through the outbox.
///
/// Field names are camelCase on the wire; the payload shape is owned by the
/// producing service and read leniently by consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique identifier, also the consumer-side dedup key.
    pub event_id: EventId,

    /// Versioned event type, e.g. `"order.created.v1"`.
    pub event_type: String,

    /// When the producing service recorded the event.
    pub occurred_at: DateTime<Utc>,

    /// Name of the producing service.
    pub producer: String,

    /// Envelope schema version.
    pub schema_version: String,

    /// Correlation id for tracing a flow across services.
    pub trace_id: String,

    /// Type-specific payload.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Creates a new envelope with a fresh event id and trace id.
    pub fn new(
        event_type: impl Into<String>,
        producer: impl Into<String>,
        payload: serde_json::Value,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            occurred_at: clock.now(),
            producer: producer.into(),
            schema_version: "v1".to_string(),
            trace_id: Uuid::new_v4().to_string(),
            payload,
        }
    }

    /// Parses a raw broker message, returning `None` for blank or malformed
    /// input. Poison messages are skipped, never escalated.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        serde_json::from_str(raw).ok()
    }

    /// Serializes the envelope to its wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Reads a string field from the payload, treating blank values as absent.
    pub fn payload_str(&self, key: &str) -> Option<String> {
        let value = self.payload.get(key)?;
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => return None,
            other => other.to_string(),
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Reads an integer field from the payload, accepting numeric strings.
    pub fn payload_i64(&self, key: &str) -> Option<i64> {
        match self.payload.get(key)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::PaymentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        match raw {
            "PENDING" => Ok(PaymentStatus::Pending),
            "AUTHORIZED" => Ok(PaymentStatus::Authorized),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(PaymentError::UnknownStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment intent against the provider.
///
/// `idempotency_key` is the caller-facing dedup key; retried creation
/// with the same key returns the existing row without touching the
/// provider. `provider_payment_id` is the provider's handle and the
/// join key for webhook settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub idempotency_key: String,
    pub provider_payment_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    /// Set by a failed webhook, cleared again by an authorized one.
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dead letters start `Pending` and become `Requeued` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadLetterStatus {
    Pending,
    Requeued,
}

impl DeadLetterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterStatus::Pending => "PENDING",
            DeadLetterStatus::Requeued => "REQUEUED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        match raw {
            "PENDING" => Ok(DeadLetterStatus::Pending),
            "REQUEUED" => Ok(DeadLetterStatus::Requeued),
            other => Err(PaymentError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for DeadLetterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment creation that exhausted its provider attempts. Carries
/// everything needed to retry the intent later without the original
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDeadLetter {
    pub id: i64,
    pub idempotency_key: String,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub status: DeadLetterStatus,
    pub attempts: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub requeued_payment_id: Option<PaymentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_round_trips() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Authorized,
            PaymentStatus::Failed,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(PaymentStatus::parse("VOID").is_err());
    }

    #[test]
    fn only_pending_payments_are_live() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Authorized.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }
}

use common::{OrderId, PaymentId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    #[error("No payment recorded for order {0}")]
    NoPaymentForOrder(OrderId),

    #[error("Dead letter not found: {0}")]
    DeadLetterNotFound(i64),

    #[error("Dead letter {0} is already resolved")]
    DeadLetterResolved(i64),

    #[error("Payment amount must be positive")]
    InvalidAmount,

    #[error("Payment provider unavailable after {attempts} attempts: {reason}")]
    ProviderUnavailable { attempts: u32, reason: String },

    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown payment status: {0}")]
    UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, PaymentError>;

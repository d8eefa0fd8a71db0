use common::OrderId;
use thiserror::Error;

use crate::record::OrderStatus;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Order must contain at least one item")]
    EmptyOrder,

    #[error("Invalid order item: {0}")]
    InvalidItem(String),

    #[error("Order {order_id} is {status} and cannot be {action}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, OrderError>;

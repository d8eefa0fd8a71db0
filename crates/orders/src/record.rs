use chrono::{DateTime, Utc};
use common::{Money, OrderId, Sku, UserId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// Order lifecycle states.
///
/// `Created` is transient: creation immediately advances to
/// `PaymentPending` once the outbox row is written. `Confirmed` and
/// `Cancelled` are terminal and never transition out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    PaymentPending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::PaymentPending => "PAYMENT_PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, OrderError> {
        match raw {
            "CREATED" => Ok(OrderStatus::Created),
            "PAYMENT_PENDING" => Ok(OrderStatus::PaymentPending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an order as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub sku: Sku,
    pub quantity: i64,
    pub unit_price: Money,
}

/// A persisted order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub sku: Sku,
    pub quantity: i64,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// The saga root. `total_amount` is derived from the items at creation
/// and never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub currency: String,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::Created,
            OrderStatus::PaymentPending,
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::parse("SHIPPED").is_err());
    }

    #[test]
    fn only_confirmed_and_cancelled_are_terminal() {
        assert!(!OrderStatus::Created.is_terminal());
        assert!(!OrderStatus::PaymentPending.is_terminal());
        assert!(OrderStatus::Confirmed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn line_total_multiplies_price_by_quantity() {
        let item = OrderItem {
            product_id: 1,
            sku: Sku::new("SKU-1"),
            quantity: 3,
            unit_price: Money::from_cents(1999),
        };
        assert_eq!(item.line_total(), Money::from_cents(5997));
    }
}

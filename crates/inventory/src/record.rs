use chrono::{DateTime, Utc};
use common::{OrderId, Sku};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// Lifecycle of a single reservation row.
///
/// `Reserved` is the only live state; `Released` and `Confirmed` are
/// terminal. Re-applying the transition that produced a terminal state
/// is a no-op, any other transition out of a terminal state is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Reserved,
    Released,
    Confirmed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Confirmed => "CONFIRMED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, InventoryError> {
        match raw {
            "RESERVED" => Ok(ReservationStatus::Reserved),
            "RELEASED" => Ok(ReservationStatus::Released),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            other => Err(InventoryError::UnknownStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Reserved)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-SKU stock row. `available` and `reserved` only move together:
/// reserving shifts quantity from one column to the other, so their sum
/// is invariant under reserve/release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStock {
    pub sku: Sku,
    pub available: i64,
    pub reserved: i64,
    pub updated_at: DateTime<Utc>,
}

/// A hold on `quantity` units of `sku`, keyed by a caller-chosen id.
///
/// Saga reservations use `"{order_id}:{sku}"` so the same order event
/// replayed twice maps onto the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReservation {
    pub reservation_id: String,
    pub sku: Sku,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl InventoryReservation {
    /// Reservation id used by the order saga for one (order, SKU) pair.
    pub fn saga_id(order_id: &OrderId, sku: &Sku) -> String {
        format!("{order_id}:{sku}")
    }
}

/// Read-model snapshot of a stock row, returned by service operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockView {
    pub sku: Sku,
    pub available: i64,
    pub reserved: i64,
}

impl From<&InventoryStock> for StockView {
    fn from(stock: &InventoryStock) -> Self {
        StockView {
            sku: stock.sku.clone(),
            available: stock.available,
            reserved: stock.reserved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ReservationStatus::Reserved,
            ReservationStatus::Released,
            ReservationStatus::Confirmed,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ReservationStatus::parse("HELD").is_err());
    }

    #[test]
    fn saga_id_joins_order_and_sku() {
        let order_id = OrderId::from_uuid(Uuid::nil());
        let sku = Sku::new("SKU-1");
        assert_eq!(
            InventoryReservation::saga_id(&order_id, &sku),
            format!("{}:SKU-1", Uuid::nil())
        );
    }
}

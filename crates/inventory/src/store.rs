use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Sku;

use crate::error::Result;
use crate::record::{InventoryReservation, InventoryStock};

/// Persistence boundary for stock rows and reservations.
///
/// Implementations do not enforce business rules; callers serialize
/// writes per SKU through [`crate::lock::SkuLock`] before mutating.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_stock(&self, sku: &Sku) -> Result<Option<InventoryStock>>;

    /// Insert or replace the stock row for `stock.sku`.
    async fn save_stock(&self, stock: &InventoryStock) -> Result<()>;

    async fn list_stock(&self) -> Result<Vec<InventoryStock>>;

    /// Insert a new reservation row. Fails with
    /// [`crate::InventoryError::DuplicateReservation`] if the id exists.
    async fn insert_reservation(&self, reservation: &InventoryReservation) -> Result<()>;

    async fn get_reservation(&self, reservation_id: &str) -> Result<Option<InventoryReservation>>;

    async fn update_reservation(&self, reservation: &InventoryReservation) -> Result<()>;

    /// Reservations whose id starts with `prefix`, used to walk every
    /// (order, SKU) reservation of one order.
    async fn find_reservations_by_prefix(&self, prefix: &str)
        -> Result<Vec<InventoryReservation>>;

    /// Live reservations with `expires_at < now`, oldest expiry first,
    /// at most `limit` rows.
    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InventoryReservation>>;
}

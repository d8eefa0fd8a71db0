use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Sku;
use tokio::sync::RwLock;

use crate::error::{InventoryError, Result};
use crate::record::{InventoryReservation, InventoryStock, ReservationStatus};
use crate::store::InventoryStore;

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct InMemoryInventoryStore {
    stock: RwLock<HashMap<Sku, InventoryStock>>,
    reservations: RwLock<HashMap<String, InventoryReservation>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reservation rows, for test assertions.
    pub async fn reservation_count(&self) -> usize {
        self.reservations.read().await.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_stock(&self, sku: &Sku) -> Result<Option<InventoryStock>> {
        Ok(self.stock.read().await.get(sku).cloned())
    }

    async fn save_stock(&self, stock: &InventoryStock) -> Result<()> {
        self.stock
            .write()
            .await
            .insert(stock.sku.clone(), stock.clone());
        Ok(())
    }

    async fn list_stock(&self) -> Result<Vec<InventoryStock>> {
        let mut rows: Vec<InventoryStock> = self.stock.read().await.values().cloned().collect();
        rows.sort_by(|a, b| a.sku.as_str().cmp(b.sku.as_str()));
        Ok(rows)
    }

    async fn insert_reservation(&self, reservation: &InventoryReservation) -> Result<()> {
        let mut reservations = self.reservations.write().await;
        if reservations.contains_key(&reservation.reservation_id) {
            return Err(InventoryError::DuplicateReservation(
                reservation.reservation_id.clone(),
            ));
        }
        reservations.insert(reservation.reservation_id.clone(), reservation.clone());
        Ok(())
    }

    async fn get_reservation(&self, reservation_id: &str) -> Result<Option<InventoryReservation>> {
        Ok(self.reservations.read().await.get(reservation_id).cloned())
    }

    async fn update_reservation(&self, reservation: &InventoryReservation) -> Result<()> {
        let mut reservations = self.reservations.write().await;
        if !reservations.contains_key(&reservation.reservation_id) {
            return Err(InventoryError::ReservationNotFound(
                reservation.reservation_id.clone(),
            ));
        }
        reservations.insert(reservation.reservation_id.clone(), reservation.clone());
        Ok(())
    }

    async fn find_reservations_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<InventoryReservation>> {
        let mut rows: Vec<InventoryReservation> = self
            .reservations
            .read()
            .await
            .values()
            .filter(|r| r.reservation_id.starts_with(prefix))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.reservation_id.cmp(&b.reservation_id));
        Ok(rows)
    }

    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InventoryReservation>> {
        let mut rows: Vec<InventoryReservation> = self
            .reservations
            .read()
            .await
            .values()
            .filter(|r| r.status == ReservationStatus::Reserved && r.expires_at < now)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.expires_at);
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(id: &str, expires_at: DateTime<Utc>) -> InventoryReservation {
        let now = Utc::now();
        InventoryReservation {
            reservation_id: id.to_string(),
            sku: Sku::new("SKU-1"),
            quantity: 1,
            status: ReservationStatus::Reserved,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryInventoryStore::new();
        let row = reservation("o1:SKU-1", Utc::now());
        store.insert_reservation(&row).await.unwrap();
        assert!(matches!(
            store.insert_reservation(&row).await,
            Err(InventoryError::DuplicateReservation(_))
        ));
    }

    #[tokio::test]
    async fn find_expired_orders_by_expiry_and_honors_limit() {
        let store = InMemoryInventoryStore::new();
        let now = Utc::now();
        store
            .insert_reservation(&reservation("a", now - Duration::minutes(2)))
            .await
            .unwrap();
        store
            .insert_reservation(&reservation("b", now - Duration::minutes(5)))
            .await
            .unwrap();
        store
            .insert_reservation(&reservation("c", now + Duration::minutes(5)))
            .await
            .unwrap();

        let expired = store.find_expired(now, 1).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].reservation_id, "b");
    }

    #[tokio::test]
    async fn prefix_lookup_returns_only_matching_rows() {
        let store = InMemoryInventoryStore::new();
        let now = Utc::now();
        store
            .insert_reservation(&reservation("o1:SKU-1", now))
            .await
            .unwrap();
        store
            .insert_reservation(&reservation("o1:SKU-2", now))
            .await
            .unwrap();
        store
            .insert_reservation(&reservation("o2:SKU-1", now))
            .await
            .unwrap();

        let rows = store.find_reservations_by_prefix("o1:").await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}

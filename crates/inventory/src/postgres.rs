//! PostgreSQL-backed inventory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Sku;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{InventoryError, Result};
use crate::record::{InventoryReservation, InventoryStock, ReservationStatus};
use crate::store::InventoryStore;

#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_stock(row: PgRow) -> Result<InventoryStock> {
        Ok(InventoryStock {
            sku: Sku::new(row.try_get::<String, _>("sku")?),
            available: row.try_get("available")?,
            reserved: row.try_get("reserved")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<InventoryReservation> {
        let status: String = row.try_get("status")?;
        Ok(InventoryReservation {
            reservation_id: row.try_get("reservation_id")?,
            sku: Sku::new(row.try_get::<String, _>("sku")?),
            quantity: row.try_get("quantity")?,
            status: ReservationStatus::parse(&status)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get_stock(&self, sku: &Sku) -> Result<Option<InventoryStock>> {
        let row = sqlx::query(
            "SELECT sku, available, reserved, updated_at FROM inventory_stock WHERE sku = $1",
        )
        .bind(sku.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_stock).transpose()
    }

    async fn save_stock(&self, stock: &InventoryStock) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_stock (sku, available, reserved, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sku) DO UPDATE
            SET available = EXCLUDED.available,
                reserved = EXCLUDED.reserved,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(stock.sku.as_str())
        .bind(stock.available)
        .bind(stock.reserved)
        .bind(stock.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_stock(&self) -> Result<Vec<InventoryStock>> {
        let rows = sqlx::query(
            "SELECT sku, available, reserved, updated_at FROM inventory_stock ORDER BY sku ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_stock).collect()
    }

    async fn insert_reservation(&self, reservation: &InventoryReservation) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_reservations
                (reservation_id, sku, quantity, status, created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (reservation_id) DO NOTHING
            "#,
        )
        .bind(&reservation.reservation_id)
        .bind(reservation.sku.as_str())
        .bind(reservation.quantity)
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .bind(reservation.expires_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(InventoryError::DuplicateReservation(
                reservation.reservation_id.clone(),
            ));
        }
        Ok(())
    }

    async fn get_reservation(&self, reservation_id: &str) -> Result<Option<InventoryReservation>> {
        let row = sqlx::query(
            r#"
            SELECT reservation_id, sku, quantity, status, created_at, updated_at, expires_at
            FROM inventory_reservations
            WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_reservation).transpose()
    }

    async fn update_reservation(&self, reservation: &InventoryReservation) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_reservations
            SET status = $2, updated_at = $3, expires_at = $4
            WHERE reservation_id = $1
            "#,
        )
        .bind(&reservation.reservation_id)
        .bind(reservation.status.as_str())
        .bind(reservation.updated_at)
        .bind(reservation.expires_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(InventoryError::ReservationNotFound(
                reservation.reservation_id.clone(),
            ));
        }
        Ok(())
    }

    async fn find_reservations_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<InventoryReservation>> {
        // LIKE with the prefix escaped; reservation ids are "{order}:{sku}".
        let pattern = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let rows = sqlx::query(
            r#"
            SELECT reservation_id, sku, quantity, status, created_at, updated_at, expires_at
            FROM inventory_reservations
            WHERE reservation_id LIKE $1
            ORDER BY reservation_id ASC
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InventoryReservation>> {
        let rows = sqlx::query(
            r#"
            SELECT reservation_id, sku, quantity, status, created_at, updated_at, expires_at
            FROM inventory_reservations
            WHERE status = 'RESERVED' AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_reservation).collect()
    }
}

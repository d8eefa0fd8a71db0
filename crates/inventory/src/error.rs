use common::Sku;
use thiserror::Error;

use crate::record::ReservationStatus;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("SKU not found: {0}")]
    SkuNotFound(Sku),

    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: Sku,
        requested: i64,
        available: i64,
    },

    #[error("Reservation already exists: {0}")]
    DuplicateReservation(String),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    #[error("Reservation {reservation_id} is {status}, expected RESERVED")]
    InvalidReservationState {
        reservation_id: String,
        status: ReservationStatus,
    },

    #[error("Could not acquire inventory lock for SKU {0}")]
    LockContention(Sku),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown reservation status: {0}")]
    UnknownStatus(String),
}

impl InventoryError {
    /// Contention and infrastructure failures are safe to retry; business
    /// rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InventoryError::LockContention(_) | InventoryError::Database(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;

//! Stock ledger and reservation lifecycle.
//!
//! Every mutation of a SKU's stock row happens under a short-lived
//! per-SKU lock, so concurrent reservations for the same SKU serialize
//! instead of overselling. Reservations carry a TTL and are swept back
//! into available stock when they expire without confirmation.

pub mod consumer;
pub mod error;
pub mod lock;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod service;
pub mod store;

pub use consumer::InventorySagaConsumer;
pub use error::{InventoryError, Result};
pub use lock::{InMemorySkuLock, SkuLock, LOCK_TTL};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use record::{InventoryReservation, InventoryStock, ReservationStatus, StockView};
pub use service::{InventoryService, RESERVATION_TTL};
pub use store::InventoryStore;

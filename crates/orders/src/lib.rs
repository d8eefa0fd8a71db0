//! Order lifecycle: creation, payment settlement, and timeout recovery.
//!
//! An order is the saga root. Creation reserves no stock and takes no
//! payment itself; it records the order, emits `order.created.v1`
//! through the outbox, and waits in `PaymentPending` for downstream
//! services to report back. Orders that never hear back are cancelled
//! by the timeout sweep.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod service;
pub mod store;

pub use consumer::{PaymentResultConsumer, ReservationFailedConsumer};
pub use error::{OrderError, Result};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use record::{NewOrderItem, Order, OrderItem, OrderStatus};
pub use service::{OrderService, PAYMENT_DEADLINE, TIMEOUT_BATCH};
pub use store::OrderStore;

//! Topic names connecting producers and consumers.
//!
//! Topic and event-type strings are identical and versioned, so a consumer
//! can evolve per version without a registry.

pub const ORDER_CREATED: &str = "order.created.v1";
pub const ORDER_TIMED_OUT: &str = "order.timed-out.v1";
pub const INVENTORY_RESERVED: &str = "inventory.reserved.v1";
pub const INVENTORY_RESERVATION_FAILED: &str = "inventory.reservation.failed.v1";
pub const PAYMENT_AUTHORIZED: &str = "payment.authorized.v1";
pub const PAYMENT_FAILED: &str = "payment.failed.v1";

//! Shared types for the saga coordination services.

pub mod clock;
pub mod money;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use money::Money;
pub use types::{EventId, OrderId, PaymentId, Sku, UserId};

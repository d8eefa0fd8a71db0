//! Transactional outbox and consumer dedup guard.
//!
//! Producers append an event row in the same local commit as the business
//! change it describes; an independent publisher drains pending rows to the
//! broker with bounded retry and quarantines exhausted rows as `Failed`
//! until an administrative replay. Consumers convert the resulting
//! at-least-once delivery into at-most-once effect through [`DedupGuard`].

pub mod cleanup;
pub mod dedup;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod publisher;
pub mod record;
pub mod store;
pub mod writer;

pub use cleanup::{CleanupReport, RetentionCleanup, RetentionConfig};
pub use dedup::DedupGuard;
pub use error::{OutboxError, Result};
pub use memory::{InMemoryDedupStore, InMemoryOutboxStore};
pub use postgres::{PostgresDedupStore, PostgresOutboxStore};
pub use publisher::{OutboxPublisher, PublishOutcome, RetryPolicy};
pub use record::{OutboxEvent, OutboxStatus};
pub use store::{DedupStore, OutboxStore};
pub use writer::OutboxWriter;

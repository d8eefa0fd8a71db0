//! Payment intents and provider resilience.
//!
//! Calls to the payment provider are the flaky edge of the saga:
//! intents are idempotency-keyed so retries never double-charge, the
//! provider is retried a bounded number of times, and exhausted
//! attempts land in a dead-letter table an operator can requeue once
//! the provider recovers. Settlement arrives asynchronously through
//! webhooks, deduplicated by provider event id.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod provider;
pub mod record;
pub mod service;
pub mod store;

pub use consumer::OrderCreatedConsumer;
pub use error::{PaymentError, Result};
pub use memory::{InMemoryDeadLetterStore, InMemoryPaymentStore};
pub use postgres::{PostgresDeadLetterStore, PostgresPaymentStore, PostgresWebhookStore};
pub use provider::{PaymentProvider, ProviderError, SimulatedPaymentProvider};
pub use record::{DeadLetterStatus, Payment, PaymentStatus, ProviderDeadLetter};
pub use service::{PaymentService, WebhookOutcome, DEFAULT_CURRENCY, PROVIDER_ATTEMPTS};
pub use store::{DeadLetterStore, PaymentStore};

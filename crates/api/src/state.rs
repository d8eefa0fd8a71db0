//! Shared application state and service wiring.

use std::sync::Arc;
use std::time::Duration;

use common::{Clock, SystemClock};
use inventory::{
    InMemoryInventoryStore, InMemorySkuLock, InventorySagaConsumer, InventoryService,
    InventoryStore,
};
use messaging::{Dispatcher, InMemoryBroker};
use orders::{OrderService, OrderStore, PaymentResultConsumer, ReservationFailedConsumer};
use outbox::{
    DedupGuard, DedupStore, InMemoryDedupStore, InMemoryOutboxStore, OutboxPublisher, OutboxStore,
    OutboxWriter, PostgresDedupStore, PostgresOutboxStore, RetentionCleanup, RetentionConfig,
    RetryPolicy,
};
use payments::{
    DeadLetterStore, InMemoryDeadLetterStore, InMemoryPaymentStore, OrderCreatedConsumer,
    PaymentProvider, PaymentService, PaymentStore, PostgresDeadLetterStore, PostgresPaymentStore,
    PostgresWebhookStore, SimulatedPaymentProvider,
};
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state accessible from all handlers and loops.
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub inventory: Arc<InventoryService>,
    pub payments: Arc<PaymentService>,
    pub publisher: Arc<OutboxPublisher>,
    pub cleanup: Arc<RetentionCleanup>,
    pub provider: Arc<dyn PaymentProvider>,
    pub broker: Arc<InMemoryBroker>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Saga timing and throughput knobs, normally taken from [`Config`].
#[derive(Debug, Clone)]
pub struct Tuning {
    pub payment_deadline: Duration,
    pub reservation_ttl: Duration,
    pub outbox_batch_size: usize,
    pub outbox_max_retry: i32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            payment_deadline: orders::PAYMENT_DEADLINE,
            reservation_ttl: inventory::RESERVATION_TTL,
            outbox_batch_size: 100,
            outbox_max_retry: RetryPolicy::default().max_retry,
        }
    }
}

impl From<&Config> for Tuning {
    fn from(config: &Config) -> Self {
        Self {
            payment_deadline: config.payment_deadline,
            reservation_ttl: config.reservation_ttl,
            outbox_batch_size: config.outbox_batch_size,
            outbox_max_retry: config.outbox_max_retry,
        }
    }
}

/// The persistence backends behind one deployment: a single outbox
/// table, per-service business stores, and the two marker tables.
struct Stores {
    outbox: Arc<dyn OutboxStore>,
    consumed: Arc<dyn DedupStore>,
    webhooks: Arc<dyn DedupStore>,
    orders: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryStore>,
    payments: Arc<dyn PaymentStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
}

/// Wires every store backend into fully in-memory state, suitable for
/// local runs and tests.
pub fn create_default_state() -> Arc<AppState> {
    create_in_memory_state(Tuning::default())
}

/// In-memory state with explicit tuning, for single-process runs
/// without a database.
pub fn create_in_memory_state(tuning: Tuning) -> Arc<AppState> {
    wire(
        Stores {
            outbox: Arc::new(InMemoryOutboxStore::new()),
            consumed: Arc::new(InMemoryDedupStore::new()),
            webhooks: Arc::new(InMemoryDedupStore::new()),
            orders: Arc::new(orders::InMemoryOrderStore::new()),
            inventory: Arc::new(InMemoryInventoryStore::new()),
            payments: Arc::new(InMemoryPaymentStore::new()),
            dead_letters: Arc::new(InMemoryDeadLetterStore::new()),
        },
        tuning,
    )
}

/// Wires state over PostgreSQL-backed stores sharing one pool. The SKU
/// lock stays in-process, which is only correct for a single instance.
pub fn create_postgres_state(pool: PgPool, tuning: Tuning) -> Arc<AppState> {
    wire(
        Stores {
            outbox: Arc::new(PostgresOutboxStore::new(pool.clone())),
            consumed: Arc::new(PostgresDedupStore::new(pool.clone())),
            webhooks: Arc::new(PostgresWebhookStore::new(pool.clone())),
            orders: Arc::new(orders::PostgresOrderStore::new(pool.clone())),
            inventory: Arc::new(inventory::PostgresInventoryStore::new(pool.clone())),
            payments: Arc::new(PostgresPaymentStore::new(pool.clone())),
            dead_letters: Arc::new(PostgresDeadLetterStore::new(pool)),
        },
        tuning,
    )
}

/// Assembles the whole saga over the given stores: one broker, one
/// dispatcher carrying every service's consumers, one publisher.
fn wire(stores: Stores, tuning: Tuning) -> Arc<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broker = Arc::new(InMemoryBroker::new());

    let order_service = Arc::new(
        OrderService::new(
            stores.orders,
            OutboxWriter::new(stores.outbox.clone(), clock.clone(), "order-service"),
            clock.clone(),
        )
        .with_payment_deadline(tuning.payment_deadline),
    );

    let inventory_service = Arc::new(
        InventoryService::new(
            stores.inventory,
            Arc::new(InMemorySkuLock::new(clock.clone())),
            clock.clone(),
        )
        .with_reservation_ttl(tuning.reservation_ttl),
    );

    let provider = Arc::new(SimulatedPaymentProvider::reliable());
    let payment_service = Arc::new(PaymentService::new(
        stores.payments,
        stores.dead_letters,
        DedupGuard::new(stores.webhooks, clock.clone()),
        provider.clone(),
        OutboxWriter::new(stores.outbox.clone(), clock.clone(), "payment-service"),
        clock.clone(),
    ));

    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Arc::new(InventorySagaConsumer::new(
        inventory_service.clone(),
        DedupGuard::new(stores.consumed.clone(), clock.clone()).with_group("inventory-service"),
        OutboxWriter::new(stores.outbox.clone(), clock.clone(), "inventory-service"),
    )));
    dispatcher.register(Arc::new(OrderCreatedConsumer::new(
        payment_service.clone(),
        DedupGuard::new(stores.consumed.clone(), clock.clone()).with_group("payment-service"),
    )));
    dispatcher.register(Arc::new(PaymentResultConsumer::new(order_service.clone())));
    dispatcher.register(Arc::new(ReservationFailedConsumer::new(
        order_service.clone(),
        DedupGuard::new(stores.consumed.clone(), clock.clone()).with_group("order-service"),
    )));

    let publisher = Arc::new(
        OutboxPublisher::new(
            stores.outbox.clone(),
            broker.clone(),
            clock.clone(),
            RetryPolicy::new(tuning.outbox_max_retry),
        )
        .with_batch_size(tuning.outbox_batch_size),
    );
    let cleanup = Arc::new(RetentionCleanup::new(
        stores.outbox,
        stores.consumed,
        clock,
        RetentionConfig::default(),
    ));

    Arc::new(AppState {
        orders: order_service,
        inventory: inventory_service,
        payments: payment_service,
        publisher,
        cleanup,
        provider,
        broker,
        dispatcher: Arc::new(dispatcher),
    })
}

//! HTTP API server and background loops for the order saga.
//!
//! Exposes REST endpoints for orders, inventory, payments, and the
//! administrative surface (outbox replay, sweeps, dead letters), with
//! structured logging (tracing) and Prometheus metrics. The saga itself
//! runs in the background loops: outbox drain, event dispatch, order
//! timeout sweep, reservation expiry sweep, and retention cleanup.

pub mod background;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Tuning, create_default_state, create_in_memory_state, create_postgres_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/orders/{id}/confirm", post(routes::orders::confirm))
        .route("/orders/{id}/payment", get(routes::payments::for_order))
        .route("/inventory", get(routes::inventory::list))
        .route("/inventory/{sku}", put(routes::inventory::upsert))
        .route("/inventory/{sku}", get(routes::inventory::get))
        .route("/payments/intents", post(routes::payments::create_intent))
        .route("/payments/{id}", get(routes::payments::get))
        .route("/webhooks/payments", post(routes::payments::webhook))
        .route("/admin/outbox/replay", post(routes::admin::replay_failed))
        .route("/admin/orders/timeout-sweep", post(routes::admin::timeout_sweep))
        .route(
            "/admin/reservations/expiry-sweep",
            post(routes::admin::expiry_sweep),
        )
        .route(
            "/admin/retention/cleanup",
            post(routes::admin::retention_cleanup),
        )
        .route("/admin/dead-letters", get(routes::admin::list_dead_letters))
        .route(
            "/admin/dead-letters/{id}/requeue",
            post(routes::admin::requeue_dead_letter),
        )
        .route("/admin/provider/outage", put(routes::admin::set_outage_mode))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

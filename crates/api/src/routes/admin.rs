//! Administrative endpoints: replay, sweeps, and dead-letter handling.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use payments::{DeadLetterStatus, ProviderDeadLetter};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::payments::PaymentResponse;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SweepResponse {
    pub affected: usize,
}

/// POST /admin/outbox/replay — requeue FAILED outbox rows for delivery.
#[tracing::instrument(skip(state))]
pub async fn replay_failed(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, ApiError> {
    let affected = state.publisher.replay_failed().await?;
    Ok(Json(SweepResponse { affected }))
}

/// POST /admin/orders/timeout-sweep — cancel orders stuck awaiting payment.
#[tracing::instrument(skip(state))]
pub async fn timeout_sweep(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, ApiError> {
    let affected = state.orders.mark_timed_out_orders().await?;
    Ok(Json(SweepResponse { affected }))
}

/// POST /admin/reservations/expiry-sweep — release lapsed reservations.
#[tracing::instrument(skip(state))]
pub async fn expiry_sweep(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, ApiError> {
    let affected = state.inventory.release_expired(100).await?;
    Ok(Json(SweepResponse { affected }))
}

/// POST /admin/retention/cleanup — purge old outbox rows and markers.
#[tracing::instrument(skip(state))]
pub async fn retention_cleanup(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, ApiError> {
    let report = state.cleanup.run().await?;
    Ok(Json(SweepResponse {
        affected: report.total() as usize,
    }))
}

#[derive(Deserialize)]
pub struct DeadLetterQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct DeadLetterResponse {
    pub id: i64,
    pub order_id: String,
    pub user_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub attempts: i32,
    pub reason: String,
    pub requeued_payment_id: Option<String>,
}

impl From<ProviderDeadLetter> for DeadLetterResponse {
    fn from(dead_letter: ProviderDeadLetter) -> Self {
        DeadLetterResponse {
            id: dead_letter.id,
            order_id: dead_letter.order_id.to_string(),
            user_id: dead_letter.user_id.as_i64(),
            amount_cents: dead_letter.amount.cents(),
            currency: dead_letter.currency,
            status: dead_letter.status.to_string(),
            attempts: dead_letter.attempts,
            reason: dead_letter.reason,
            requeued_payment_id: dead_letter.requeued_payment_id.map(|id| id.to_string()),
        }
    }
}

/// GET /admin/dead-letters — list provider dead letters, newest first.
pub async fn list_dead_letters(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeadLetterQuery>,
) -> Result<Json<Vec<DeadLetterResponse>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            DeadLetterStatus::parse(&raw.to_ascii_uppercase())
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ),
    };
    let rows = state.payments.list_dead_letters(status, 100).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// POST /admin/dead-letters/{id}/requeue — retry a dead-lettered payment.
#[tracing::instrument(skip(state))]
pub async fn requeue_dead_letter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state.payments.requeue_dead_letter(id).await?;
    Ok(Json(payment.into()))
}

#[derive(Debug, Deserialize)]
pub struct OutageRequest {
    pub enabled: bool,
}

#[derive(Serialize)]
pub struct OutageResponse {
    pub outage_mode: bool,
}

/// PUT /admin/provider/outage — flip the simulated provider outage.
#[tracing::instrument(skip(state))]
pub async fn set_outage_mode(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OutageRequest>,
) -> Result<Json<OutageResponse>, ApiError> {
    state.provider.set_outage_mode(req.enabled);
    Ok(Json(OutageResponse {
        outage_mode: state.provider.outage_mode(),
    }))
}

//! Payment endpoints and the provider webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, PaymentId, UserId};
use payments::{Payment, WebhookOutcome};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::orders::parse_order_id;
use crate::state::AppState;

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub user_id: i64,
    pub provider_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub failure_reason: Option<String>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        PaymentResponse {
            id: payment.id.to_string(),
            order_id: payment.order_id.to_string(),
            user_id: payment.user_id.as_i64(),
            provider_payment_id: payment.provider_payment_id,
            amount_cents: payment.amount.cents(),
            currency: payment.currency,
            status: payment.status.to_string(),
            failure_reason: payment.failure_reason,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub provider_event_id: Option<String>,
    pub provider_payment_id: String,
    /// `"authorized"` or `"failed"`.
    pub status: String,
    /// Provider-supplied decline reason, only meaningful on `"failed"`.
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub outcome: &'static str,
}

#[derive(Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: String,
    pub user_id: i64,
    pub amount_cents: i64,
    pub currency: Option<String>,
}

/// POST /payments/intents — open a payment intent directly, outside the
/// saga path. Idempotent per order.
#[tracing::instrument(skip(state, req))]
pub async fn create_intent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let order_id = parse_order_id(&req.order_id)?;
    let payment = state
        .payments
        .create_pending_for_order(
            &order_id,
            UserId::new(req.user_id),
            Money::from_cents(req.amount_cents),
            req.currency.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// GET /payments/{id} — fetch one payment.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id = PaymentId::parse(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid payment id: {e}")))?;
    let payment = state.payments.get_payment(&payment_id).await?;
    Ok(Json(payment.into()))
}

/// GET /orders/{id}/payment — the payment backing an order.
pub async fn for_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let payment = state.payments.get_payment_for_order(&order_id).await?;
    Ok(Json(payment.into()))
}

/// POST /webhooks/payments — provider settlement callback.
#[tracing::instrument(skip(state, req))]
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let authorized = match req.status.as_str() {
        "authorized" => true,
        "failed" => false,
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown webhook status: {other}"
            )));
        }
    };
    let outcome = state
        .payments
        .handle_webhook(
            req.provider_event_id.as_deref(),
            &req.provider_payment_id,
            authorized,
            req.reason.as_deref(),
        )
        .await?;
    let outcome = match outcome {
        WebhookOutcome::Authorized => "authorized",
        WebhookOutcome::Failed => "failed",
        WebhookOutcome::AlreadyProcessed => "already_processed",
        WebhookOutcome::Ignored => "ignored",
    };
    Ok(Json(WebhookResponse { outcome }))
}

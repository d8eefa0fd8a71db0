//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, OrderId, Sku, UserId};
use orders::{NewOrderItem, Order};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub items: Vec<OrderItemRequest>,
}

fn default_currency() -> String {
    payments::DEFAULT_CURRENCY.to_string()
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub sku: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: i64,
    pub currency: String,
    pub total_cents: i64,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub sku: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        OrderResponse {
            id: order.id.to_string(),
            user_id: order.user_id.as_i64(),
            currency: order.currency,
            total_cents: order.total_amount.cents(),
            status: order.status.to_string(),
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    sku: item.sku.as_str().to_string(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /orders — create a new order and start its saga.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let items = req
        .items
        .into_iter()
        .map(|item| NewOrderItem {
            product_id: item.product_id,
            sku: Sku::new(item.sku),
            quantity: item.quantity,
            unit_price: Money::from_cents(item.unit_price_cents),
        })
        .collect();
    let order = state
        .orders
        .create_order(UserId::new(req.user_id), &req.currency, items)
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Option<i64>,
}

/// GET /orders — list recent orders, optionally for one user.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .orders
        .list_orders(query.user_id.map(UserId::new), 100)
        .await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /orders/{id} — fetch one order.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.get_order(&order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/cancel — cancel a live order.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.cancel_order(&order_id).await?;
    // Cancellation also frees any reservations the saga took.
    state.inventory.release_for_order(&order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/confirm — operator confirmation.
#[tracing::instrument(skip(state))]
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.confirm_order(&order_id).await?;
    state.inventory.confirm_for_order(&order_id).await?;
    Ok(Json(order.into()))
}

pub(crate) fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

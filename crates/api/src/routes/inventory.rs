//! Inventory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::Sku;
use inventory::StockView;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpsertStockRequest {
    pub available: i64,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub sku: String,
    pub available: i64,
    pub reserved: i64,
}

impl From<StockView> for StockResponse {
    fn from(view: StockView) -> Self {
        StockResponse {
            sku: view.sku.to_string(),
            available: view.available,
            reserved: view.reserved,
        }
    }
}

/// PUT /inventory/{sku} — create or restock a SKU.
#[tracing::instrument(skip(state, req))]
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Path(sku): Path<String>,
    Json(req): Json<UpsertStockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let sku = Sku::new(sku);
    if sku.is_blank() {
        return Err(ApiError::BadRequest("SKU must not be blank".to_string()));
    }
    let view = state.inventory.upsert_stock(&sku, req.available).await?;
    Ok(Json(view.into()))
}

/// GET /inventory — list stock rows.
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StockResponse>>, ApiError> {
    let rows = state.inventory.list_stock().await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /inventory/{sku} — fetch one stock row.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(sku): Path<String>,
) -> Result<Json<StockResponse>, ApiError> {
    let view = state.inventory.get_stock(&Sku::new(sku)).await?;
    Ok(Json(view.into()))
}

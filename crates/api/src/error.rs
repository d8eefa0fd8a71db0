//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;
use orders::OrderError;
use payments::PaymentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order lifecycle error.
    Order(OrderError),
    /// Inventory error.
    Inventory(InventoryError),
    /// Payment error.
    Payment(PaymentError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn order_error_to_response(err: OrderError) -> (StatusCode, String) {
    let status = match &err {
        OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InvalidCurrency(_) | OrderError::EmptyOrder | OrderError::InvalidItem(_) => {
            StatusCode::BAD_REQUEST
        }
        OrderError::InvalidState { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, String) {
    let status = match &err {
        InventoryError::SkuNotFound(_) | InventoryError::ReservationNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        InventoryError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
        InventoryError::InsufficientStock { .. }
        | InventoryError::DuplicateReservation(_)
        | InventoryError::InvalidReservationState { .. }
        | InventoryError::LockContention(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String) {
    let status = match &err {
        PaymentError::PaymentNotFound(_)
        | PaymentError::NoPaymentForOrder(_)
        | PaymentError::DeadLetterNotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::DeadLetterResolved(_) => StatusCode::CONFLICT,
        PaymentError::InvalidAmount => StatusCode::BAD_REQUEST,
        PaymentError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<outbox::OutboxError> for ApiError {
    fn from(err: outbox::OutboxError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

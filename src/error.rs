use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::delivery::DeliveryStatus;

/// Which address of a delivery request could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    Pickup,
    Dropoff,
}

impl std::fmt::Display for AddressField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressField::Pickup => f.write_str("pickup"),
            AddressField::Dropoff => f.write_str("dropoff"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("could not find {field} address: {address}")]
    AddressNotFound { field: AddressField, address: String },

    #[error("cannot move delivery from {from} to {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("delivery already accepted by another agent")]
    AlreadyAccepted,

    #[error("authentication required")]
    Unauthenticated,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("delivery already has a payment: {0}")]
    DuplicatePayment(String),

    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::AddressNotFound { .. } => "address_not_found",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::AlreadyAccepted => "already_accepted",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::DuplicatePayment(_) => "duplicate_payment",
            AppError::PaymentDeclined(_) => "payment_declined",
            AppError::Storage(_) => "storage",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AddressNotFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidTransition { .. }
            | AppError::AlreadyAccepted
            | AppError::DuplicatePayment(_) => StatusCode::CONFLICT,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }

        let body = Json(json!({
            "kind": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

use crate::signature::SignatureError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Webhook failed signature verification.
    Signature(SignatureError),
    /// Checkout service error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Signature(err) => {
                tracing::warn!(error = %err, "webhook rejected");
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::ItemNotFound(_) | CheckoutError::UnknownPayment(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        CheckoutError::InsufficientStock { .. } | CheckoutError::InventoryShortfallOnConfirm(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        CheckoutError::Gateway(_) => {
            tracing::warn!(error = %err, "payment gateway error");
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        CheckoutError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<SignatureError> for ApiError {
    fn from(err: SignatureError) -> Self {
        ApiError::Signature(err)
    }
}

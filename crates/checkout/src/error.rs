//! Checkout error types.

use std::time::Duration;

use common::ItemId;
use domain::DomainError;
use store::{PaymentLookup, StoreError};
use thiserror::Error;

use crate::alert::InventoryShortfall;

/// Failures talking to the payment processor.
///
/// None of these leave state behind, so the caller may retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The processor could not be reached.
    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),

    /// The processor answered with an error status.
    #[error("Payment processor rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// No answer within the configured bound.
    #[error("Payment processor did not respond within {0:?}")]
    Timeout(Duration),

    /// The processor answered with something we cannot use.
    #[error("Invalid payment processor response: {0}")]
    InvalidResponse(String),

    /// The gateway client could not be built from its configuration.
    #[error("Payment gateway misconfigured: {0}")]
    Configuration(String),
}

/// Errors surfaced by the checkout services.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Bad input from the caller. Not retried.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The catalog has no such item.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// No payment matches the confirmation.
    #[error("Unknown payment: {0}")]
    UnknownPayment(PaymentLookup),

    /// Stock is known to be too low for the request.
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u32,
        available: u32,
    },

    /// The payment processor failed; nothing was persisted.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A payment succeeded but its stock could not be decremented.
    #[error("{0}")]
    InventoryShortfallOnConfirm(InventoryShortfall),

    /// Infrastructure failure in a store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::InvalidRequest(_) => "invalid_request",
            CheckoutError::ItemNotFound(_) => "item_not_found",
            CheckoutError::UnknownPayment(_) => "unknown_payment",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::Gateway(_) => "gateway",
            CheckoutError::InventoryShortfallOnConfirm(_) => "inventory_shortfall",
            CheckoutError::Store(_) => "store",
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(e: DomainError) -> Self {
        CheckoutError::InvalidRequest(e.to_string())
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

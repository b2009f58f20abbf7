//! Domain error types.

use thiserror::Error;

/// Errors raised when a domain value fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Quantities must be strictly positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Prices must be strictly positive.
    #[error("Invalid price: {cents} (must be greater than 0)")]
    InvalidPrice { cents: i64 },

    /// Not a three-letter ISO 4217 code.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Unrecognised payment status.
    #[error("Invalid payment status: {0}")]
    InvalidStatus(String),

    /// unit price × quantity does not fit in the amount type.
    #[error("Amount overflow: {unit_cents} x {quantity}")]
    AmountOverflow { unit_cents: i64, quantity: u32 },
}

//! Payment status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// The status of a payment in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Success
///           └──► Failed
/// ```
/// Both `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Checkout session opened, awaiting the processor's outcome.
    #[default]
    Pending,

    /// Processor confirmed the payment (terminal state).
    Success,

    /// Processor reported failure or expiry (terminal state).
    Failed,
}

impl PaymentStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    /// Returns true if the payment may move to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Success)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }

    /// Returns the status name as stored and exposed over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    /// Case-insensitive parse of `PENDING`, `SUCCESS` or `FAILED`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            _ => Err(DomainError::InvalidStatus(s.to_string())),
        }
    }
}

/// Outcome reported by a confirmation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Success,
    Failed,
}

impl PaymentOutcome {
    /// The terminal status this outcome moves a pending payment to.
    pub fn status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Success => PaymentStatus::Success,
            PaymentOutcome::Failed => PaymentStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentOutcome {
    type Err = DomainError;

    /// Accepts only terminal statuses; `PENDING` is not an outcome.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<PaymentStatus>()? {
            PaymentStatus::Success => Ok(PaymentOutcome::Success),
            PaymentStatus::Failed => Ok(PaymentOutcome::Failed),
            PaymentStatus::Pending => Err(DomainError::InvalidStatus(s.to_string())),
        }
    }
}

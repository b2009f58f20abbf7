pub mod health;
pub mod metrics;
pub mod payments;
pub mod stock;
pub mod webhook;

use checkout::{InventoryShortfall, Reconciliation};
use domain::PendingPayment;
use serde::Serialize;

use crate::error::ApiError;

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: i64,
    pub item_id: i64,
    pub quantity: u32,
    pub amount_cents: i64,
    pub currency: String,
    pub order_id: String,
    pub external_reference: String,
    pub status: String,
    pub created_at: String,
    pub settled_at: Option<String>,
}

impl From<PendingPayment> for PaymentResponse {
    fn from(p: PendingPayment) -> Self {
        Self {
            id: p.id.as_i64(),
            item_id: p.item_id.as_i64(),
            quantity: p.quantity,
            amount_cents: p.amount.cents(),
            currency: p.currency.to_string(),
            order_id: p.order_id.to_string(),
            external_reference: p.external_reference.to_string(),
            status: p.status.to_string(),
            created_at: p.created_at.to_rfc3339(),
            settled_at: p.settled_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Outcome of applying a confirmation.
#[derive(Serialize)]
pub struct ConfirmationResponse {
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<InventoryShortfall>,
}

impl ConfirmationResponse {
    /// The processor does not report the session paid yet; nothing changed.
    pub fn awaiting_payment() -> Self {
        Self {
            result: "awaiting_payment",
            payment: None,
            shortfall: None,
        }
    }
}

impl From<Reconciliation> for ConfirmationResponse {
    fn from(r: Reconciliation) -> Self {
        let (result, payment, shortfall) = match r {
            Reconciliation::Settled(p) => ("settled", Some(p.into()), None),
            Reconciliation::Declined(p) => ("declined", Some(p.into()), None),
            Reconciliation::Duplicate(p) => ("duplicate", Some(p.into()), None),
            Reconciliation::Shortfall(s) => ("shortfall", None, Some(s)),
            Reconciliation::Unknown => ("unknown", None, None),
        };
        Self {
            result,
            payment,
            shortfall,
        }
    }
}

pub(crate) fn parse_id(kind: &str, raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id '{raw}': {e}")))
}

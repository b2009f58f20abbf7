//! Payment records tied to external checkout sessions.

mod state;

pub use state::{PaymentOutcome, PaymentStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Currency, ExternalReference, ItemId, Money, OrderId, PaymentId};

/// A payment awaiting (or having received) its processor outcome.
///
/// Records are append-only: once created they only ever see a single
/// transition out of `Pending`, and they are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPayment {
    pub id: PaymentId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub amount: Money,
    pub currency: Currency,
    pub order_id: OrderId,
    pub external_reference: ExternalReference,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    /// Set once, when the payment reaches a terminal status.
    pub settled_at: Option<DateTime<Utc>>,
}

impl PendingPayment {
    /// Builds a fresh `Pending` record from an insert request.
    pub fn from_new(id: PaymentId, new: NewPayment) -> Self {
        Self {
            id,
            item_id: new.item_id,
            quantity: new.quantity,
            amount: new.amount,
            currency: new.currency,
            order_id: new.order_id,
            external_reference: new.external_reference,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// Applies `outcome` if the payment is still pending.
    ///
    /// Returns false, leaving the record untouched, when it is already terminal.
    pub fn settle(&mut self, outcome: PaymentOutcome) -> bool {
        let next = outcome.status();
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.settled_at = Some(Utc::now());
        true
    }
}

/// Data needed to persist a new pending payment.
///
/// Only constructed once the checkout gateway has returned a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub item_id: ItemId,
    pub quantity: u32,
    pub amount: Money,
    pub currency: Currency,
    pub order_id: OrderId,
    pub external_reference: ExternalReference,
}

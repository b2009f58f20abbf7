//! Reconciliation: apply processor outcomes to pending payments.
//!
//! Confirmations may arrive more than once and concurrently. The settlement
//! store applies the status compare-and-set and the stock decrement as one
//! unit, so only the delivery that finds the payment pending touches stock.

use std::sync::Arc;

use common::{ExternalReference, OrderId, PaymentId};
use domain::{PaymentOutcome, PendingPayment};
use store::{PaymentLookup, Settlement, SettlementStore};

use crate::alert::{InventoryShortfall, ShortfallAlerter};
use crate::error::{CheckoutError, Result};

/// What a confirmation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Payment moved to SUCCESS and stock was decremented.
    Settled(PendingPayment),
    /// Payment moved to FAILED. Stock untouched.
    Declined(PendingPayment),
    /// Payment was already terminal; nothing changed.
    Duplicate(PendingPayment),
    /// Payment moved to SUCCESS but stock could not cover it.
    Shortfall(InventoryShortfall),
    /// No payment matches the reference.
    Unknown,
}

/// Parses an outcome string (`SUCCESS`/`FAILED`, any case).
pub fn parse_outcome(raw: &str) -> Result<PaymentOutcome> {
    raw.parse::<PaymentOutcome>()
        .map_err(|_| CheckoutError::InvalidRequest(format!("invalid payment outcome: {raw}")))
}

/// Applies confirmation outcomes exactly once per payment.
#[derive(Clone)]
pub struct ReconciliationService {
    settlements: Arc<dyn SettlementStore>,
    alerter: Arc<dyn ShortfallAlerter>,
}

impl ReconciliationService {
    pub fn new(settlements: Arc<dyn SettlementStore>, alerter: Arc<dyn ShortfallAlerter>) -> Self {
        Self {
            settlements,
            alerter,
        }
    }

    /// Confirms a payment by its processor reference.
    ///
    /// Webhook-facing: an unknown reference is logged and reported as
    /// `Unknown`, and a shortfall is reported as `Shortfall`, so the
    /// processor's delivery is always acknowledged.
    pub async fn confirm_by_reference(
        &self,
        reference: &ExternalReference,
        outcome: PaymentOutcome,
    ) -> Result<Reconciliation> {
        match self
            .apply_outcome(PaymentLookup::Reference(reference.clone()), outcome)
            .await
        {
            Err(CheckoutError::UnknownPayment(_)) => {
                tracing::warn!(%reference, %outcome, "confirmation for unknown payment ignored");
                Ok(Reconciliation::Unknown)
            }
            Err(CheckoutError::InventoryShortfallOnConfirm(shortfall)) => {
                Ok(Reconciliation::Shortfall(shortfall))
            }
            other => other,
        }
    }

    /// Confirms a payment by business order id.
    pub async fn confirm_by_order(
        &self,
        order_id: &OrderId,
        outcome: PaymentOutcome,
    ) -> Result<Reconciliation> {
        self.apply_outcome(PaymentLookup::Order(order_id.clone()), outcome)
            .await
    }

    /// Confirms a payment by its internal id.
    pub async fn confirm_by_payment_id(
        &self,
        id: PaymentId,
        outcome: PaymentOutcome,
    ) -> Result<Reconciliation> {
        self.apply_outcome(PaymentLookup::Id(id), outcome).await
    }

    /// Moves the payment out of PENDING and, on the first SUCCESS, takes
    /// the stock in the same unit.
    ///
    /// Fails with `UnknownPayment` when nothing matches, and with
    /// `InventoryShortfallOnConfirm` when the payment is recorded as
    /// successful but the ledger cannot cover it. In that case the status
    /// stays SUCCESS and the shortfall is raised with the alerter. A store
    /// failure leaves the payment PENDING, so the delivery can be retried.
    #[tracing::instrument(skip(self, lookup), fields(lookup = %lookup))]
    pub async fn apply_outcome(
        &self,
        lookup: PaymentLookup,
        outcome: PaymentOutcome,
    ) -> Result<Reconciliation> {
        metrics::counter!("payment_confirmations_total", "outcome" => outcome.as_str())
            .increment(1);

        let settlement = self
            .settlements
            .settle(&lookup, outcome)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, "settlement failed, payment left pending");
            })?;

        match settlement {
            Settlement::Settled { payment, stock } => {
                metrics::counter!("stock_decrements_total").increment(1);
                tracing::info!(
                    payment_id = %payment.id,
                    item_id = %stock.item_id,
                    remaining = stock.available,
                    "payment settled, stock decremented"
                );
                Ok(Reconciliation::Settled(payment))
            }
            Settlement::Declined(payment) => {
                tracing::info!(payment_id = %payment.id, "payment failed");
                Ok(Reconciliation::Declined(payment))
            }
            Settlement::Shortfall { payment, available } => {
                Err(self.shortfall(&payment, available).await)
            }
            Settlement::AlreadyTerminal(payment) => {
                metrics::counter!("duplicate_deliveries_total").increment(1);
                tracing::info!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    "payment already settled, confirmation ignored"
                );
                Ok(Reconciliation::Duplicate(payment))
            }
            Settlement::NotFound => {
                metrics::counter!("unknown_payment_deliveries_total").increment(1);
                Err(CheckoutError::UnknownPayment(lookup))
            }
        }
    }

    async fn shortfall(&self, payment: &PendingPayment, available: u32) -> CheckoutError {
        metrics::counter!("inventory_shortfalls_total").increment(1);
        let shortfall = InventoryShortfall {
            payment_id: payment.id,
            order_id: payment.order_id.clone(),
            external_reference: payment.external_reference.clone(),
            item_id: payment.item_id,
            requested: payment.quantity,
            available,
        };
        self.alerter.raise(&shortfall).await;
        CheckoutError::InventoryShortfallOnConfirm(shortfall)
    }
}

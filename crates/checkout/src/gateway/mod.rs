//! Payment processor boundary.

pub mod memory;
pub mod stripe;

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::ExternalReference;
use domain::{Currency, Money};

use crate::error::GatewayError;

pub use memory::InMemoryCheckoutGateway;
pub use stripe::StripeCheckoutGateway;

/// Everything the processor needs to open a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Total to charge (unit price × quantity).
    pub amount: Money,
    pub unit_price: Money,
    pub quantity: u32,
    pub currency: Currency,
    /// Product name shown to the payer.
    pub name: String,
    pub description: String,
    /// Echoed back by the processor on its events.
    pub metadata: BTreeMap<String, String>,
}

/// An opened checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub external_reference: ExternalReference,
    /// Where to redirect the payer.
    pub checkout_url: String,
}

/// Payment state of a checkout session as the processor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPaymentStatus {
    Paid,
    /// Completed with a delayed payment method, or not completed at all.
    Unpaid,
    NoPaymentRequired,
}

impl SessionPaymentStatus {
    /// Parses the processor's `payment_status` field.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "paid" => Some(SessionPaymentStatus::Paid),
            "unpaid" => Some(SessionPaymentStatus::Unpaid),
            "no_payment_required" => Some(SessionPaymentStatus::NoPaymentRequired),
            _ => None,
        }
    }

    /// True when nothing more is owed on the session.
    pub fn is_settled(&self) -> bool {
        !matches!(self, SessionPaymentStatus::Unpaid)
    }
}

/// Trait for talking to a payment processor's checkout sessions.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    /// Opens a new session.
    ///
    /// Each call opens a new session; de-duplicating retries is the caller's
    /// responsibility.
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Asks the processor whether a session has been paid.
    ///
    /// An unknown session is `Rejected` with status 404.
    async fn session_status(
        &self,
        reference: &ExternalReference,
    ) -> Result<SessionPaymentStatus, GatewayError>;
}

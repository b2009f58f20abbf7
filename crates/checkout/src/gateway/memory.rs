//! In-memory checkout gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ExternalReference;
use tokio::sync::Mutex;

use super::{CheckoutGateway, CheckoutSession, SessionPaymentStatus, SessionRequest};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sessions: Vec<(ExternalReference, SessionRequest)>,
    payment_status: HashMap<ExternalReference, SessionPaymentStatus>,
    next_id: u32,
    fail_on_create: bool,
    delay: Option<Duration>,
}

/// In-memory checkout gateway for testing and local development.
///
/// Hands out sequential `cs_test_NNNN` references and records every request.
/// Sessions start out unpaid.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckoutGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryCheckoutGateway {
    /// Base of the checkout URLs handed out.
    pub const CHECKOUT_BASE: &'static str = "https://checkout.local/pay";

    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent create calls fail until reset.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.lock().await.fail_on_create = fail;
    }

    /// Delays every create call, to exercise caller timeouts.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.delay = delay;
    }

    /// Sets the payment status reported for a session.
    pub async fn set_payment_status(
        &self,
        reference: &ExternalReference,
        status: SessionPaymentStatus,
    ) {
        self.state
            .lock()
            .await
            .payment_status
            .insert(reference.clone(), status);
    }

    /// Returns the number of sessions opened.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Returns the request that opened the session with this reference.
    pub async fn request_for(&self, reference: &ExternalReference) -> Option<SessionRequest> {
        self.state
            .lock()
            .await
            .sessions
            .iter()
            .find(|(r, _)| r == reference)
            .map(|(_, request)| request.clone())
    }
}

#[async_trait]
impl CheckoutGateway for InMemoryCheckoutGateway {
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let delay = self.state.lock().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        if state.fail_on_create {
            return Err(GatewayError::Unavailable(
                "simulated processor outage".to_string(),
            ));
        }

        state.next_id += 1;
        let reference = ExternalReference::new(format!("cs_test_{:04}", state.next_id));
        let checkout_url = format!("{}/{}", Self::CHECKOUT_BASE, reference);
        state.sessions.push((reference.clone(), request));
        state
            .payment_status
            .insert(reference.clone(), SessionPaymentStatus::Unpaid);

        Ok(CheckoutSession {
            external_reference: reference,
            checkout_url,
        })
    }

    async fn session_status(
        &self,
        reference: &ExternalReference,
    ) -> Result<SessionPaymentStatus, GatewayError> {
        self.state
            .lock()
            .await
            .payment_status
            .get(reference)
            .copied()
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                message: format!("No such checkout session: {reference}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use domain::{Currency, Money};

    use super::*;

    fn request() -> SessionRequest {
        SessionRequest {
            amount: Money::from_cents(2000),
            unit_price: Money::from_cents(1000),
            quantity: 2,
            currency: Currency::usd(),
            name: "Widget".to_string(),
            description: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_sequential_references() {
        let gateway = InMemoryCheckoutGateway::new();

        let s1 = gateway.create_session(request()).await.unwrap();
        let s2 = gateway.create_session(request()).await.unwrap();

        assert_eq!(s1.external_reference.as_str(), "cs_test_0001");
        assert_eq!(s2.external_reference.as_str(), "cs_test_0002");
        assert_eq!(s1.checkout_url, "https://checkout.local/pay/cs_test_0001");
        assert_eq!(gateway.session_count().await, 2);
        assert_eq!(
            gateway.request_for(&s2.external_reference).await,
            Some(request())
        );
    }

    #[tokio::test]
    async fn test_session_status() {
        let gateway = InMemoryCheckoutGateway::new();
        let session = gateway.create_session(request()).await.unwrap();
        let reference = session.external_reference;

        assert_eq!(
            gateway.session_status(&reference).await.unwrap(),
            SessionPaymentStatus::Unpaid
        );
        gateway
            .set_payment_status(&reference, SessionPaymentStatus::Paid)
            .await;
        assert_eq!(
            gateway.session_status(&reference).await.unwrap(),
            SessionPaymentStatus::Paid
        );

        let err = gateway
            .session_status(&ExternalReference::new("cs_nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let gateway = InMemoryCheckoutGateway::new();
        gateway.set_fail_on_create(true).await;

        let result = gateway.create_session(request()).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
        assert_eq!(gateway.session_count().await, 0);

        gateway.set_fail_on_create(false).await;
        assert!(gateway.create_session(request()).await.is_ok());
    }
}

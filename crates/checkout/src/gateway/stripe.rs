//! Stripe Checkout gateway.

use std::sync::Arc;

use async_trait::async_trait;
use common::ExternalReference;
use reqwest::{Client, Response};
use serde::Deserialize;

use super::{CheckoutGateway, CheckoutSession, SessionPaymentStatus, SessionRequest};
use crate::config::GatewayConfig;
use crate::error::GatewayError;

const SESSIONS_PATH: &str = "/v1/checkout/sessions";

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Opens one-off payment sessions through the Stripe Checkout API.
#[derive(Clone)]
pub struct StripeCheckoutGateway {
    config: Arc<GatewayConfig>,
    client: Client,
}

impl StripeCheckoutGateway {
    pub fn new(config: Arc<GatewayConfig>) -> Result<Self, GatewayError> {
        if config.api_key.is_empty() {
            return Err(GatewayError::Configuration("API key is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        format!("{}{SESSIONS_PATH}", self.config.api_base.trim_end_matches('/'))
    }

    fn send_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.config.timeout)
        } else {
            GatewayError::Unavailable(e.to_string())
        }
    }

    /// Decodes a session body, turning non-2xx answers into `Rejected`.
    async fn session_from(response: Response) -> Result<StripeSession, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            let message = serde_json::from_str::<StripeErrorBody>(&text)
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or(text);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    /// Form fields for a single-line-item payment session.
    fn form(&self, request: &SessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            (
                "success_url".to_string(),
                self.config.success_url_with_session(),
            ),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
            (
                "line_items[0][quantity]".to_string(),
                request.quantity.to_string(),
            ),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.unit_price.cents().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.name.clone(),
            ),
        ];
        // Stripe rejects an empty description.
        if !request.description.is_empty() {
            form.push((
                "line_items[0][price_data][product_data][description]".to_string(),
                request.description.clone(),
            ));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        form
    }
}

#[async_trait]
impl CheckoutGateway for StripeCheckoutGateway {
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.config.api_key)
            .form(&self.form(&request))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let session = Self::session_from(response).await?;
        let checkout_url = session.url.ok_or_else(|| {
            GatewayError::InvalidResponse(format!("session {} has no checkout url", session.id))
        })?;

        tracing::debug!(reference = %session.id, "stripe checkout session created");
        Ok(CheckoutSession {
            external_reference: ExternalReference::new(session.id),
            checkout_url,
        })
    }

    async fn session_status(
        &self,
        reference: &ExternalReference,
    ) -> Result<SessionPaymentStatus, GatewayError> {
        let response = self
            .client
            .get(format!("{}/{}", self.url(), reference))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let session = Self::session_from(response).await?;
        let raw = session.payment_status.unwrap_or_default();
        SessionPaymentStatus::parse(&raw).ok_or_else(|| {
            GatewayError::InvalidResponse(format!(
                "session {} has unknown payment status '{raw}'",
                session.id
            ))
        })
    }
}

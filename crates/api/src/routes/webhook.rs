//! Processor webhook receiver.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use checkout::SessionPaymentStatus;
use common::ExternalReference;
use domain::PaymentOutcome;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::signature::{self, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER};

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub result: &'static str,
}

/// Maps a checkout-session event to the outcome it reports.
///
/// `payment_status` is the session's `payment_status` field. A completed
/// session that is still unpaid used a delayed payment method; its outcome
/// arrives later as `async_payment_succeeded` or `async_payment_failed`.
/// Returns None for events that carry no payment outcome.
pub fn outcome_for(
    event_type: &str,
    payment_status: Option<&str>,
) -> Option<PaymentOutcome> {
    match event_type {
        "checkout.session.completed" => payment_status
            .and_then(SessionPaymentStatus::parse)
            .filter(SessionPaymentStatus::is_settled)
            .map(|_| PaymentOutcome::Success),
        "checkout.session.async_payment_succeeded" => Some(PaymentOutcome::Success),
        "checkout.session.expired" | "checkout.session.async_payment_failed" => {
            Some(PaymentOutcome::Failed)
        }
        _ => None,
    }
}

/// POST /payments/webhook: verified processor event.
///
/// Any verified delivery is acknowledged with 200, including ignored event
/// types and unknown sessions, so the processor stops retrying. Only
/// infrastructure failures return an error status.
#[tracing::instrument(skip_all)]
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    signature::verify(
        &body,
        header,
        state.webhook_secret.as_deref(),
        DEFAULT_TOLERANCE_SECS,
        chrono::Utc::now().timestamp(),
    )?;

    let event: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid event payload: {e}")))?;
    let event_type = event
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ApiError::BadRequest("Event has no type".to_string()))?;

    let payment_status = event
        .pointer("/data/object/payment_status")
        .and_then(|s| s.as_str());

    let Some(outcome) = outcome_for(event_type, payment_status) else {
        tracing::debug!(%event_type, ?payment_status, "ignoring webhook event");
        return Ok(Json(WebhookResponse {
            received: true,
            result: "ignored",
        }));
    };

    let session_id = event
        .pointer("/data/object/id")
        .and_then(|id| id.as_str())
        .ok_or_else(|| ApiError::BadRequest("Event has no session id".to_string()))?;

    tracing::info!(%event_type, reference = %session_id, %outcome, "webhook event received");
    let result = state
        .reconciliation
        .confirm_by_reference(&ExternalReference::new(session_id), outcome)
        .await?;

    Ok(Json(WebhookResponse {
        received: true,
        result: super::ConfirmationResponse::from(result).result,
    }))
}

//! Checkout and payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout::{CheckoutError, GatewayError, ReservationRequest, parse_outcome};
use common::{ExternalReference, ItemId, OrderId, PaymentId};
use domain::PaymentOutcome;
use serde::{Deserialize, Serialize};

use super::{ConfirmationResponse, PaymentResponse, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutSessionRequest {
    pub item_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub item_id: i64,
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutSessionResponse {
    pub payment_id: i64,
    pub order_id: String,
    pub external_reference: String,
    pub checkout_url: String,
    pub amount_cents: i64,
    pub currency: String,
}

// -- Handlers --

/// POST /payments/create-checkout-session: reserve and open a checkout session.
#[tracing::instrument(skip(state, req), fields(item_id = req.item_id, quantity = req.quantity))]
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckoutSessionRequest>,
) -> Result<(StatusCode, Json<CheckoutSessionResponse>), ApiError> {
    let mut request = ReservationRequest::new(req.item_id, req.quantity);
    request.currency = req.currency;
    request.order_id = req.order_id.map(OrderId::from);

    let reservation = state.reservations.reserve(request).await?;

    let response = CheckoutSessionResponse {
        payment_id: reservation.payment_id.as_i64(),
        order_id: reservation.order_id.to_string(),
        external_reference: reservation.external_reference.to_string(),
        checkout_url: reservation.checkout_url,
        amount_cents: reservation.amount.cents(),
        currency: reservation.currency.to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /payments/success/:reference: payer landed on the success page.
///
/// The reference comes from the payer's redirect and is not signed, so the
/// processor is asked for the session's payment status first. Only a session
/// it reports as paid is confirmed.
#[tracing::instrument(skip(state))]
pub async fn success(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<ConfirmationResponse>, ApiError> {
    let reference = ExternalReference::new(reference);
    let status = match state.gateway.session_status(&reference).await {
        Ok(status) => status,
        Err(GatewayError::Rejected { status: 404, .. }) => {
            return Err(ApiError::NotFound(format!(
                "Checkout session {reference} not found"
            )));
        }
        Err(e) => return Err(CheckoutError::Gateway(e).into()),
    };

    if !status.is_settled() {
        tracing::info!(%reference, ?status, "success page reached before payment completed");
        return Ok(Json(ConfirmationResponse::awaiting_payment()));
    }

    let result = state
        .reconciliation
        .confirm_by_reference(&reference, PaymentOutcome::Success)
        .await?;
    Ok(Json(result.into()))
}

/// POST /payments/orders/:order_id/status: trusted confirmation by order id.
///
/// Not authenticated here; deployments expose it to internal callers only.
#[tracing::instrument(skip(state, req))]
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<ConfirmationResponse>, ApiError> {
    let outcome = parse_outcome(&req.status)?;
    let result = state
        .reconciliation
        .confirm_by_order(&OrderId::new(order_id), outcome)
        .await?;
    Ok(Json(result.into()))
}

/// POST /payments/:id/status: trusted confirmation by payment id.
///
/// Same exposure as `update_order_status`.
#[tracing::instrument(skip(state, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<ConfirmationResponse>, ApiError> {
    let id = PaymentId::new(parse_id("payment", &id)?);
    let outcome = parse_outcome(&req.status)?;
    let result = state
        .reconciliation
        .confirm_by_payment_id(id, outcome)
        .await?;
    Ok(Json(result.into()))
}

/// GET /payments: every payment, ordered by id.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let payments = state.payments.list_payments().await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

/// GET /payments/:id: a single payment.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id = PaymentId::new(parse_id("payment", &id)?);
    let payment = state
        .payments
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Payment {id} not found")))?;
    Ok(Json(payment.into()))
}

/// GET /payments/latest?item_id&quantity: most recent payment for the pair.
#[tracing::instrument(skip(state))]
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .payments
        .latest_payment_for(ItemId::new(query.item_id), query.quantity)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No payment for item {} with quantity {}",
                query.item_id, query.quantity
            ))
        })?;
    Ok(Json(payment.into()))
}

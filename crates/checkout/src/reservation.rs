//! Reservation: price an item, open a checkout session, record the payment.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use common::{ExternalReference, ItemId, OrderId, PaymentId};
use domain::{Currency, Money, NewPayment};
use serde::{Deserialize, Serialize};
use store::{CatalogStore, PaymentStore, PaymentStoreExt, StockLedger, StoreError};

use crate::config::GatewayConfig;
use crate::error::{CheckoutError, GatewayError, Result};
use crate::gateway::{CheckoutGateway, SessionRequest};

/// A request to buy `quantity` units of an item.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRequest {
    pub item_id: ItemId,
    /// Signed so that zero and negative input can be rejected explicitly.
    pub quantity: i64,
    /// ISO-4217 code; the configured default when absent.
    #[serde(default)]
    pub currency: Option<String>,
    /// Caller-chosen order id; generated when absent.
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

impl ReservationRequest {
    pub fn new(item_id: impl Into<ItemId>, quantity: i64) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
            currency: None,
            order_id: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<OrderId>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }
}

/// A recorded pending payment and where to send the payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub external_reference: ExternalReference,
    pub checkout_url: String,
    pub amount: Money,
    pub currency: Currency,
}

/// Opens checkout sessions and records pending payments.
///
/// No stock is held: the availability check here is advisory, and the
/// decrement happens only when the payment is confirmed.
#[derive(Clone)]
pub struct ReservationService {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn StockLedger>,
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn CheckoutGateway>,
    config: Arc<GatewayConfig>,
}

impl ReservationService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn StockLedger>,
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn CheckoutGateway>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            payments,
            gateway,
            config,
        }
    }

    /// Reserves a purchase and returns the checkout session to redirect to.
    ///
    /// Nothing is persisted unless the gateway returns a session. A gateway
    /// failure or timeout leaves no payment record behind.
    #[tracing::instrument(skip(self, request), fields(item_id = %request.item_id, quantity = request.quantity))]
    pub async fn reserve(&self, request: ReservationRequest) -> Result<Reservation> {
        metrics::counter!("reservations_total").increment(1);
        let result = self.try_reserve(request).await;
        if let Err(e) = &result {
            metrics::counter!("reservation_failures_total", "reason" => e.kind()).increment(1);
            tracing::warn!(error = %e, "reservation failed");
        }
        result
    }

    async fn try_reserve(&self, request: ReservationRequest) -> Result<Reservation> {
        // 1. Validate input
        let quantity = u32::try_from(request.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                CheckoutError::InvalidRequest(format!(
                    "quantity must be a positive integer, got {}",
                    request.quantity
                ))
            })?;

        let currency = match request.currency.as_deref() {
            Some(code) => Currency::parse(code)?,
            None => self.config.default_currency.clone(),
        };

        // 2. Price the item
        let item = self
            .catalog
            .get_item(request.item_id)
            .await?
            .ok_or(CheckoutError::ItemNotFound(request.item_id))?;
        let amount = item.price_for(quantity)?;

        // 3. Advisory stock check; a missing record reads as zero
        let available = match self.ledger.get_available(item.id).await {
            Ok(available) => available,
            Err(StoreError::StockNotFound(_)) => 0,
            Err(e) => return Err(e.into()),
        };
        if available < quantity {
            return Err(CheckoutError::InsufficientStock {
                item_id: item.id,
                requested: quantity,
                available,
            });
        }

        // 4. Order id
        let order_id = match request.order_id {
            Some(order_id) => {
                if order_id.as_str().trim().is_empty() {
                    return Err(CheckoutError::InvalidRequest(
                        "order id must not be blank".to_string(),
                    ));
                }
                if self.payments.find_by_order(&order_id).await?.is_some() {
                    return Err(CheckoutError::InvalidRequest(format!(
                        "order {order_id} already has a payment"
                    )));
                }
                order_id
            }
            None => OrderId::generate(),
        };

        // 5. Open the checkout session
        let mut metadata = BTreeMap::new();
        metadata.insert("item_id".to_string(), item.id.to_string());
        metadata.insert("quantity".to_string(), quantity.to_string());
        metadata.insert("order_id".to_string(), order_id.to_string());

        let session_request = SessionRequest {
            amount,
            unit_price: item.unit_price,
            quantity,
            currency: currency.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            metadata,
        };

        let started = Instant::now();
        let session =
            tokio::time::timeout(self.config.timeout, self.gateway.create_session(session_request))
                .await;
        metrics::histogram!("gateway_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        let session = session.map_err(|_| GatewayError::Timeout(self.config.timeout))??;

        // 6. Record the pending payment
        let payment = self
            .payments
            .insert(NewPayment {
                item_id: item.id,
                quantity,
                amount,
                currency: currency.clone(),
                order_id: order_id.clone(),
                external_reference: session.external_reference.clone(),
            })
            .await
            .map_err(|e| match e {
                StoreError::DuplicateOrder(order_id) => CheckoutError::InvalidRequest(format!(
                    "order {order_id} already has a payment"
                )),
                other => CheckoutError::Store(other),
            })?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            reference = %payment.external_reference,
            amount = %payment.amount,
            "pending payment recorded"
        );

        Ok(Reservation {
            payment_id: payment.id,
            order_id: payment.order_id,
            external_reference: payment.external_reference,
            checkout_url: session.checkout_url,
            amount: payment.amount,
            currency: payment.currency,
        })
    }
}

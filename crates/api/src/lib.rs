//! HTTP API server for checkout reservations and payment reconciliation.
//!
//! A thin transport over the `checkout` services, with structured logging
//! (tracing), Prometheus metrics and signed processor webhooks.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;
pub mod signature;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CheckoutGateway, PaymentQueries, ReconciliationService, ReservationService, ShortfallAlerter,
    StockAdmin,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use bootstrap::{BootstrapError, Stores, create_state};
pub use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub reservations: ReservationService,
    /// Asked for a session's payment status before an unsigned success-page
    /// confirmation is applied.
    pub gateway: Arc<dyn CheckoutGateway>,
    pub reconciliation: ReconciliationService,
    pub payments: PaymentQueries,
    pub stock: StockAdmin,
    /// Signing secret for processor webhooks; every delivery is rejected
    /// when absent.
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn CheckoutGateway>,
        alerter: Arc<dyn ShortfallAlerter>,
        config: &Config,
    ) -> Self {
        let reservations = ReservationService::new(
            stores.catalog,
            stores.ledger.clone(),
            stores.payments.clone(),
            gateway.clone(),
            Arc::new(config.gateway_config()),
        );
        let reconciliation = ReconciliationService::new(stores.settlements, alerter);

        Self {
            reservations,
            gateway,
            reconciliation,
            payments: PaymentQueries::new(stores.payments),
            stock: StockAdmin::new(stores.ledger),
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/payments/create-checkout-session",
            post(routes::payments::create_checkout_session),
        )
        .route("/payments/webhook", post(routes::webhook::receive))
        .route("/payments/success/{reference}", post(routes::payments::success))
        .route(
            "/payments/orders/{order_id}/status",
            post(routes::payments::update_order_status),
        )
        .route("/payments/{id}/status", post(routes::payments::update_status))
        .route("/payments", get(routes::payments::list))
        .route("/payments/latest", get(routes::payments::latest))
        .route("/payments/{id}", get(routes::payments::get))
        .route(
            "/stock/{item_id}",
            get(routes::stock::get).put(routes::stock::set),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

//! Stock reservation and payment reconciliation.
//!
//! A purchase runs in two independent halves:
//! 1. `ReservationService::reserve` prices the item, pre-checks stock, opens a
//!    checkout session with the payment processor and records a pending payment
//! 2. `ReconciliationService` later applies the processor's outcome to that
//!    payment exactly once, decrementing stock on the first successful delivery
//!
//! No inventory is held between the two halves. A payment that succeeds after
//! stock ran out is still recorded as successful and raised as an
//! `InventoryShortfall` for manual fulfilment review.

pub mod alert;
pub mod config;
pub mod error;
pub mod gateway;
pub mod queries;
pub mod reconciliation;
pub mod reservation;

pub use alert::{InventoryShortfall, LogAlerter, RecordingAlerter, ShortfallAlerter};
pub use config::GatewayConfig;
pub use error::{CheckoutError, GatewayError};
pub use gateway::{
    CheckoutGateway, CheckoutSession, InMemoryCheckoutGateway, SessionPaymentStatus,
    SessionRequest, StripeCheckoutGateway,
};
pub use queries::{PaymentQueries, StockAdmin};
pub use reconciliation::{Reconciliation, ReconciliationService, parse_outcome};
pub use reservation::{Reservation, ReservationRequest, ReservationService};

//! Domain records for the checkout engine.
//!
//! Items, stock records and payments are independent records linked only by
//! identifier:
//! - `Item` is owned by the catalog and read-only here
//! - `StockRecord` tracks the available quantity of one item
//! - `PendingPayment` tracks one checkout session through its status machine

pub mod error;
pub mod item;
pub mod money;
pub mod payment;

pub use common::{ExternalReference, ItemId, OrderId, PaymentId};
pub use error::DomainError;
pub use item::{Item, StockRecord};
pub use money::{Currency, Money};
pub use payment::{NewPayment, PaymentOutcome, PaymentStatus, PendingPayment};

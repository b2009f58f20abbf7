//! Identifier types shared by every crate in the workspace.

pub mod types;

pub use types::{ExternalReference, ItemId, OrderId, PaymentId};

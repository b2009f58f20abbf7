//! Escalation path for payments that succeeded without stock to back them.

use std::sync::Arc;

use async_trait::async_trait;
use common::{ExternalReference, ItemId, OrderId, PaymentId};
use serde::Serialize;
use tokio::sync::Mutex;

/// A confirmed payment whose stock decrement could not be applied.
///
/// The money has already moved at the processor, so this cannot be undone
/// here; it needs manual fulfilment review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryShortfall {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub external_reference: ExternalReference,
    pub item_id: ItemId,
    pub requested: u32,
    pub available: u32,
}

impl std::fmt::Display for InventoryShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Inventory shortfall on confirmed payment {} (order {}): item {} requested {}, available {}",
            self.payment_id, self.order_id, self.item_id, self.requested, self.available
        )
    }
}

/// Receives shortfalls as they are detected.
#[async_trait]
pub trait ShortfallAlerter: Send + Sync {
    async fn raise(&self, shortfall: &InventoryShortfall);
}

/// Emits each shortfall as an error-level tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

#[async_trait]
impl ShortfallAlerter for LogAlerter {
    async fn raise(&self, shortfall: &InventoryShortfall) {
        tracing::error!(
            payment_id = %shortfall.payment_id,
            order_id = %shortfall.order_id,
            reference = %shortfall.external_reference,
            item_id = %shortfall.item_id,
            requested = shortfall.requested,
            available = shortfall.available,
            "inventory shortfall on confirmed payment, manual fulfilment required"
        );
    }
}

/// Keeps every raised shortfall in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlerter {
    raised: Arc<Mutex<Vec<InventoryShortfall>>>,
}

impl RecordingAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all shortfalls raised so far, oldest first.
    pub async fn raised(&self) -> Vec<InventoryShortfall> {
        self.raised.lock().await.clone()
    }
}

#[async_trait]
impl ShortfallAlerter for RecordingAlerter {
    async fn raise(&self, shortfall: &InventoryShortfall) {
        self.raised.lock().await.push(shortfall.clone());
    }
}

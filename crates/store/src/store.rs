use async_trait::async_trait;
use common::{ExternalReference, ItemId, OrderId, PaymentId};
use domain::{Item, NewPayment, PaymentOutcome, PendingPayment, StockRecord};

use crate::Result;

/// Read-only view of the catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Looks up an item by id.
    ///
    /// Returns None if the catalog has no such item.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>>;
}

/// Per-item available quantity.
///
/// Every implementation must make `try_decrement` linearizable with respect
/// to all other mutations on the same item, without serializing unrelated
/// items behind a shared lock.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Returns the full stock record for an item.
    ///
    /// Fails with `StockNotFound` if the item has no record.
    async fn get_record(&self, item_id: ItemId) -> Result<StockRecord>;

    /// Atomically subtracts `quantity` if at least that much is available.
    ///
    /// Fails with `InsufficientStock` (leaving the record untouched) or
    /// `StockNotFound`. Never retried internally.
    async fn try_decrement(&self, item_id: ItemId, quantity: u32) -> Result<StockRecord>;

    /// Overwrites the available quantity. Rejects negative input with
    /// `InvalidQuantity`.
    async fn set_available(&self, item_id: ItemId, quantity: i64) -> Result<StockRecord>;

    /// Returns the available quantity for an item.
    async fn get_available(&self, item_id: ItemId) -> Result<u32> {
        Ok(self.get_record(item_id).await?.available)
    }
}

/// Key used to find a single payment record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentLookup {
    Id(PaymentId),
    Reference(ExternalReference),
    Order(OrderId),
}

impl std::fmt::Display for PaymentLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentLookup::Id(id) => write!(f, "payment {id}"),
            PaymentLookup::Reference(reference) => write!(f, "reference {reference}"),
            PaymentLookup::Order(order_id) => write!(f, "order {order_id}"),
        }
    }
}

impl From<PaymentId> for PaymentLookup {
    fn from(id: PaymentId) -> Self {
        PaymentLookup::Id(id)
    }
}

impl From<ExternalReference> for PaymentLookup {
    fn from(reference: ExternalReference) -> Self {
        PaymentLookup::Reference(reference)
    }
}

impl From<OrderId> for PaymentLookup {
    fn from(order_id: OrderId) -> Self {
        PaymentLookup::Order(order_id)
    }
}

/// Result of applying an outcome to a payment together with its stock effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The payment moved to SUCCESS and its quantity was taken from stock.
    Settled {
        payment: PendingPayment,
        stock: StockRecord,
    },
    /// The payment moved to FAILED. Stock untouched.
    Declined(PendingPayment),
    /// The payment moved to SUCCESS but stock could not cover it.
    /// Stock untouched; `available` is what the ledger held.
    Shortfall {
        payment: PendingPayment,
        available: u32,
    },
    /// The payment was already terminal; nothing changed.
    AlreadyTerminal(PendingPayment),
    /// No payment matches the lookup.
    NotFound,
}

/// Durable, append-only record of payments.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a new `Pending` payment and assigns its id.
    ///
    /// Fails with `DuplicateReference` or `DuplicateOrder` if either key is
    /// already taken.
    async fn insert(&self, payment: NewPayment) -> Result<PendingPayment>;

    /// Finds a single payment by id, external reference or order id.
    async fn find(&self, lookup: &PaymentLookup) -> Result<Option<PendingPayment>>;

    /// Returns the most recently created payment for an item/quantity pair.
    async fn latest_for_item(
        &self,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<Option<PendingPayment>>;

    /// Returns every payment ordered by id.
    async fn list(&self) -> Result<Vec<PendingPayment>>;
}

/// Applies processor outcomes to payments and their stock as one unit.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Moves a `Pending` payment to the outcome's terminal status and, for
    /// SUCCESS, decrements its item's stock in the same unit.
    ///
    /// Of any number of concurrent calls for the same payment, exactly one
    /// sees it pending. A stock shortfall still commits the SUCCESS status.
    /// Any other failure commits nothing: the payment stays `Pending` and
    /// stock is untouched, so a redelivery can retry.
    async fn settle(
        &self,
        lookup: &PaymentLookup,
        outcome: PaymentOutcome,
    ) -> Result<Settlement>;
}

/// Extension trait providing convenience lookups for payment stores.
#[async_trait]
pub trait PaymentStoreExt: PaymentStore {
    async fn get(&self, id: PaymentId) -> Result<Option<PendingPayment>> {
        self.find(&PaymentLookup::Id(id)).await
    }

    async fn find_by_reference(
        &self,
        reference: &ExternalReference,
    ) -> Result<Option<PendingPayment>> {
        self.find(&PaymentLookup::Reference(reference.clone())).await
    }

    async fn find_by_order(&self, order_id: &OrderId) -> Result<Option<PendingPayment>> {
        self.find(&PaymentLookup::Order(order_id.clone())).await
    }
}

// Blanket implementation for all PaymentStore implementations
impl<T: PaymentStore + ?Sized> PaymentStoreExt for T {}

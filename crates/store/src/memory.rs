use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{ExternalReference, ItemId, OrderId, PaymentId};
use domain::{Item, NewPayment, PaymentOutcome, PaymentStatus, PendingPayment, StockRecord};
use tokio::sync::{Mutex, RwLock};

use crate::{
    Result, StoreError,
    store::{CatalogStore, PaymentLookup, PaymentStore, Settlement, SettlementStore, StockLedger},
};

/// In-memory catalog for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    items: Arc<RwLock<HashMap<ItemId, Item>>>,
}

impl InMemoryCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an item.
    pub async fn insert(&self, item: Item) {
        self.items.write().await.insert(item.id, item);
    }

    /// Returns the number of items in the catalog.
    pub async fn item_count(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.items.read().await.get(&item_id).cloned())
    }
}

/// In-memory stock ledger.
///
/// Each record sits behind its own mutex. The outer map is only locked long
/// enough to fetch a record handle, so decrements on different items never
/// wait on each other.
#[derive(Clone, Default)]
pub struct InMemoryStockLedger {
    records: Arc<RwLock<HashMap<ItemId, Arc<Mutex<StockRecord>>>>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a stock record for an item, replacing any existing one.
    pub async fn insert(&self, item_id: ItemId, available: u32) {
        self.records.write().await.insert(
            item_id,
            Arc::new(Mutex::new(StockRecord::new(item_id, available))),
        );
    }

    async fn entry(&self, item_id: ItemId) -> Result<Arc<Mutex<StockRecord>>> {
        self.records
            .read()
            .await
            .get(&item_id)
            .cloned()
            .ok_or(StoreError::StockNotFound(item_id))
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn get_record(&self, item_id: ItemId) -> Result<StockRecord> {
        let entry = self.entry(item_id).await?;
        let record = entry.lock().await;
        Ok(record.clone())
    }

    async fn try_decrement(&self, item_id: ItemId, quantity: u32) -> Result<StockRecord> {
        let entry = self.entry(item_id).await?;
        let mut record = entry.lock().await;

        if record.try_take(quantity) {
            Ok(record.clone())
        } else {
            Err(StoreError::InsufficientStock {
                item_id,
                requested: quantity,
                available: record.available,
            })
        }
    }

    async fn set_available(&self, item_id: ItemId, quantity: i64) -> Result<StockRecord> {
        let available = u32::try_from(quantity).map_err(|_| StoreError::InvalidQuantity(quantity))?;
        let entry = self.entry(item_id).await?;
        let mut record = entry.lock().await;
        record.set(available);
        Ok(record.clone())
    }
}

#[derive(Default)]
struct PaymentIndex {
    rows: BTreeMap<PaymentId, Arc<Mutex<PendingPayment>>>,
    by_reference: HashMap<ExternalReference, PaymentId>,
    by_order: HashMap<OrderId, PaymentId>,
    next_id: i64,
}

impl PaymentIndex {
    fn resolve(&self, lookup: &PaymentLookup) -> Option<Arc<Mutex<PendingPayment>>> {
        let id = match lookup {
            PaymentLookup::Id(id) => *id,
            PaymentLookup::Reference(reference) => *self.by_reference.get(reference)?,
            PaymentLookup::Order(order_id) => *self.by_order.get(order_id)?,
        };
        self.rows.get(&id).cloned()
    }
}

/// In-memory payment store.
///
/// Like the ledger, every payment has its own mutex. `InMemorySettlement`
/// runs the status compare-and-set under that mutex.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    index: Arc<RwLock<PaymentIndex>>,
}

impl InMemoryPaymentStore {
    /// Creates a new empty payment store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.index.read().await.rows.len()
    }

    async fn handles(&self) -> Vec<Arc<Mutex<PendingPayment>>> {
        self.index.read().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: NewPayment) -> Result<PendingPayment> {
        let mut index = self.index.write().await;

        if index.by_reference.contains_key(&payment.external_reference) {
            return Err(StoreError::DuplicateReference(payment.external_reference));
        }
        if index.by_order.contains_key(&payment.order_id) {
            return Err(StoreError::DuplicateOrder(payment.order_id));
        }

        index.next_id += 1;
        let id = PaymentId::new(index.next_id);
        let record = PendingPayment::from_new(id, payment);

        index
            .by_reference
            .insert(record.external_reference.clone(), id);
        index.by_order.insert(record.order_id.clone(), id);
        index
            .rows
            .insert(id, Arc::new(Mutex::new(record.clone())));

        Ok(record)
    }

    async fn find(&self, lookup: &PaymentLookup) -> Result<Option<PendingPayment>> {
        let handle = self.index.read().await.resolve(lookup);
        match handle {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn latest_for_item(
        &self,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<Option<PendingPayment>> {
        let mut latest: Option<PendingPayment> = None;
        for handle in self.handles().await {
            let payment = handle.lock().await;
            if payment.item_id != item_id || payment.quantity != quantity {
                continue;
            }
            // Ids grow with insertion order, so ties on created_at go to the later id.
            let newer = latest
                .as_ref()
                .is_none_or(|current| payment.created_at >= current.created_at);
            if newer {
                latest = Some(payment.clone());
            }
        }
        Ok(latest)
    }

    async fn list(&self) -> Result<Vec<PendingPayment>> {
        let mut payments = Vec::new();
        for handle in self.handles().await {
            payments.push(handle.lock().await.clone());
        }
        Ok(payments)
    }
}

/// In-memory settlement over a payment store and any stock ledger.
///
/// The payment's mutex is held across the ledger call, so a concurrent
/// delivery for the same payment waits and then sees it terminal. Locks are
/// always taken payment first, then stock.
#[derive(Clone)]
pub struct InMemorySettlement {
    payments: InMemoryPaymentStore,
    ledger: Arc<dyn StockLedger>,
}

impl InMemorySettlement {
    pub fn new(payments: InMemoryPaymentStore, ledger: Arc<dyn StockLedger>) -> Self {
        Self { payments, ledger }
    }
}

#[async_trait]
impl SettlementStore for InMemorySettlement {
    async fn settle(
        &self,
        lookup: &PaymentLookup,
        outcome: PaymentOutcome,
    ) -> Result<Settlement> {
        let Some(handle) = self.payments.index.read().await.resolve(lookup) else {
            return Ok(Settlement::NotFound);
        };

        let mut payment = handle.lock().await;
        if payment.status != PaymentStatus::Pending {
            return Ok(Settlement::AlreadyTerminal(payment.clone()));
        }

        if outcome == PaymentOutcome::Failed {
            payment.settle(outcome);
            return Ok(Settlement::Declined(payment.clone()));
        }

        // The status is only written once the ledger has answered.
        let available = match self
            .ledger
            .try_decrement(payment.item_id, payment.quantity)
            .await
        {
            Ok(stock) => {
                payment.settle(outcome);
                return Ok(Settlement::Settled {
                    payment: payment.clone(),
                    stock,
                });
            }
            Err(StoreError::InsufficientStock { available, .. }) => available,
            Err(StoreError::StockNotFound(_)) => 0,
            Err(e) => return Err(e),
        };

        payment.settle(outcome);
        Ok(Settlement::Shortfall {
            payment: payment.clone(),
            available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Currency, Money};

    fn new_payment(n: u32, item_id: i64, quantity: u32) -> NewPayment {
        NewPayment {
            item_id: ItemId::new(item_id),
            quantity,
            amount: Money::from_cents(1000 * i64::from(quantity)),
            currency: Currency::usd(),
            order_id: OrderId::new(format!("ord-{n}")),
            external_reference: ExternalReference::new(format!("cs_{n}")),
        }
    }

    #[tokio::test]
    async fn catalog_lookup() {
        let catalog = InMemoryCatalog::new();
        let item = Item::new(1, "Widget", "", Money::from_cents(500)).unwrap();
        catalog.insert(item.clone()).await;

        assert_eq!(catalog.get_item(ItemId::new(1)).await.unwrap(), Some(item));
        assert_eq!(catalog.get_item(ItemId::new(2)).await.unwrap(), None);
        assert_eq!(catalog.item_count().await, 1);
    }

    #[tokio::test]
    async fn decrement_within_available() {
        let ledger = InMemoryStockLedger::new();
        ledger.insert(ItemId::new(1), 5).await;

        let record = ledger.try_decrement(ItemId::new(1), 3).await.unwrap();
        assert_eq!(record.available, 2);
        assert_eq!(ledger.get_available(ItemId::new(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn decrement_beyond_available_changes_nothing() {
        let ledger = InMemoryStockLedger::new();
        ledger.insert(ItemId::new(1), 2).await;
        let before = ledger.get_record(ItemId::new(1)).await.unwrap();

        let err = ledger.try_decrement(ItemId::new(1), 3).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(ledger.get_record(ItemId::new(1)).await.unwrap(), before);
    }

    #[tokio::test]
    async fn decrement_unknown_item() {
        let ledger = InMemoryStockLedger::new();
        let err = ledger.try_decrement(ItemId::new(9), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::StockNotFound(_)));
    }

    #[tokio::test]
    async fn set_available_rejects_negative() {
        let ledger = InMemoryStockLedger::new();
        ledger.insert(ItemId::new(1), 2).await;

        let err = ledger.set_available(ItemId::new(1), -1).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuantity(-1)));
        assert_eq!(ledger.get_available(ItemId::new(1)).await.unwrap(), 2);

        let record = ledger.set_available(ItemId::new(1), 40).await.unwrap();
        assert_eq!(record.available, 40);
    }

    #[tokio::test]
    async fn concurrent_decrements_never_oversell() {
        let ledger = InMemoryStockLedger::new();
        ledger.insert(ItemId::new(1), 10).await;

        let mut handles = Vec::new();
        for _ in 0..25 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.try_decrement(ItemId::new(1), 1).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(ledger.get_available(ItemId::new(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = InMemoryPaymentStore::new();
        let p1 = store.insert(new_payment(1, 1, 1)).await.unwrap();
        let p2 = store.insert(new_payment(2, 1, 1)).await.unwrap();

        assert_eq!(p1.id, PaymentId::new(1));
        assert_eq!(p2.id, PaymentId::new(2));
        assert_eq!(p1.status, PaymentStatus::Pending);
        assert_eq!(store.payment_count().await, 2);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_keys() {
        let store = InMemoryPaymentStore::new();
        store.insert(new_payment(1, 1, 1)).await.unwrap();

        let mut same_reference = new_payment(2, 1, 1);
        same_reference.external_reference = ExternalReference::new("cs_1");
        assert!(matches!(
            store.insert(same_reference).await,
            Err(StoreError::DuplicateReference(_))
        ));

        let mut same_order = new_payment(3, 1, 1);
        same_order.order_id = OrderId::new("ord-1");
        assert!(matches!(
            store.insert(same_order).await,
            Err(StoreError::DuplicateOrder(_))
        ));

        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn find_by_every_key() {
        let store = InMemoryPaymentStore::new();
        let payment = store.insert(new_payment(1, 1, 1)).await.unwrap();

        for lookup in [
            PaymentLookup::Id(payment.id),
            PaymentLookup::Reference(ExternalReference::new("cs_1")),
            PaymentLookup::Order(OrderId::new("ord-1")),
        ] {
            assert_eq!(store.find(&lookup).await.unwrap(), Some(payment.clone()));
        }
        assert_eq!(
            store
                .find(&PaymentLookup::Reference(ExternalReference::new("cs_x")))
                .await
                .unwrap(),
            None
        );
    }

    struct FailingLedger {
        inner: InMemoryStockLedger,
        failures: Mutex<u32>,
    }

    #[async_trait]
    impl StockLedger for FailingLedger {
        async fn get_record(&self, item_id: ItemId) -> Result<StockRecord> {
            self.inner.get_record(item_id).await
        }

        async fn try_decrement(&self, item_id: ItemId, quantity: u32) -> Result<StockRecord> {
            let mut failures = self.failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.try_decrement(item_id, quantity).await
        }

        async fn set_available(&self, item_id: ItemId, quantity: i64) -> Result<StockRecord> {
            self.inner.set_available(item_id, quantity).await
        }
    }

    async fn settlement(
        available: u32,
    ) -> (InMemorySettlement, InMemoryPaymentStore, InMemoryStockLedger) {
        let payments = InMemoryPaymentStore::new();
        let ledger = InMemoryStockLedger::new();
        ledger.insert(ItemId::new(1), available).await;
        let settlement = InMemorySettlement::new(payments.clone(), Arc::new(ledger.clone()));
        (settlement, payments, ledger)
    }

    #[tokio::test]
    async fn settle_success_takes_stock() {
        let (settlement, payments, ledger) = settlement(5).await;
        payments.insert(new_payment(1, 1, 3)).await.unwrap();
        let lookup = PaymentLookup::Reference(ExternalReference::new("cs_1"));

        let result = settlement
            .settle(&lookup, PaymentOutcome::Success)
            .await
            .unwrap();
        let Settlement::Settled { payment, stock } = result else {
            panic!("expected Settled, got {result:?}");
        };
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(stock.available, 2);
        assert_eq!(ledger.get_available(ItemId::new(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn settle_is_first_writer_wins() {
        let (settlement, payments, ledger) = settlement(5).await;
        payments.insert(new_payment(1, 1, 1)).await.unwrap();
        let lookup = PaymentLookup::Reference(ExternalReference::new("cs_1"));

        let first = settlement
            .settle(&lookup, PaymentOutcome::Failed)
            .await
            .unwrap();
        assert!(matches!(first, Settlement::Declined(ref p) if p.status == PaymentStatus::Failed));

        let second = settlement
            .settle(&lookup, PaymentOutcome::Success)
            .await
            .unwrap();
        assert!(
            matches!(second, Settlement::AlreadyTerminal(ref p) if p.status == PaymentStatus::Failed)
        );
        assert_eq!(ledger.get_available(ItemId::new(1)).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn settle_unknown_payment() {
        let (settlement, _, _) = settlement(5).await;
        let result = settlement
            .settle(&PaymentLookup::Id(PaymentId::new(4)), PaymentOutcome::Success)
            .await
            .unwrap();
        assert_eq!(result, Settlement::NotFound);
    }

    #[tokio::test]
    async fn settle_shortfall_commits_success() {
        let (settlement, payments, ledger) = settlement(1).await;
        let payment = payments.insert(new_payment(1, 1, 2)).await.unwrap();

        let result = settlement
            .settle(&PaymentLookup::Id(payment.id), PaymentOutcome::Success)
            .await
            .unwrap();
        assert!(matches!(
            result,
            Settlement::Shortfall { ref payment, available: 1 } if payment.status == PaymentStatus::Success
        ));
        assert_eq!(ledger.get_available(ItemId::new(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn settle_ledger_failure_leaves_payment_pending() {
        let payments = InMemoryPaymentStore::new();
        let inner = InMemoryStockLedger::new();
        inner.insert(ItemId::new(1), 5).await;
        let ledger = Arc::new(FailingLedger {
            inner: inner.clone(),
            failures: Mutex::new(1),
        });
        let settlement = InMemorySettlement::new(payments.clone(), ledger);
        payments.insert(new_payment(1, 1, 2)).await.unwrap();
        let lookup = PaymentLookup::Reference(ExternalReference::new("cs_1"));

        let err = settlement
            .settle(&lookup, PaymentOutcome::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        let stored = payments.find(&lookup).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(stored.settled_at.is_none());

        // Redelivery settles it properly.
        let retried = settlement
            .settle(&lookup, PaymentOutcome::Success)
            .await
            .unwrap();
        assert!(matches!(retried, Settlement::Settled { ref payment, .. } if payment.id == stored.id));
        assert_eq!(inner.get_available(ItemId::new(1)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn concurrent_settlements_apply_once() {
        let (settlement, payments, ledger) = settlement(10).await;
        payments.insert(new_payment(1, 1, 1)).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..20 {
            let settlement = settlement.clone();
            let outcome = if n % 2 == 0 {
                PaymentOutcome::Success
            } else {
                PaymentOutcome::Failed
            };
            handles.push(tokio::spawn(async move {
                settlement
                    .settle(&PaymentLookup::Order(OrderId::new("ord-1")), outcome)
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        let mut settled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Settlement::Settled { .. } => {
                    applied += 1;
                    settled += 1;
                }
                Settlement::Declined(_) => applied += 1,
                _ => {}
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(
            ledger.get_available(ItemId::new(1)).await.unwrap(),
            10 - settled
        );
    }

    #[tokio::test]
    async fn latest_for_item_picks_newest_match() {
        let store = InMemoryPaymentStore::new();
        store.insert(new_payment(1, 1, 2)).await.unwrap();
        store.insert(new_payment(2, 1, 3)).await.unwrap();
        let newest = store.insert(new_payment(3, 1, 2)).await.unwrap();
        store.insert(new_payment(4, 2, 2)).await.unwrap();

        let latest = store.latest_for_item(ItemId::new(1), 2).await.unwrap();
        assert_eq!(latest.map(|p| p.id), Some(newest.id));
        assert!(store.latest_for_item(ItemId::new(3), 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_ordered_by_id() {
        let store = InMemoryPaymentStore::new();
        for n in 1..=5 {
            store.insert(new_payment(n, 1, 1)).await.unwrap();
        }
        let ids: Vec<i64> = store
            .list()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id.as_i64())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }
}

//! Read-side lookups and administrative stock updates.

use std::sync::Arc;

use common::{ItemId, PaymentId};
use domain::{PendingPayment, StockRecord};
use store::{PaymentStore, PaymentStoreExt, StockLedger, StoreError};

use crate::error::{CheckoutError, Result};

/// Payment listings and lookups.
#[derive(Clone)]
pub struct PaymentQueries {
    payments: Arc<dyn PaymentStore>,
}

impl PaymentQueries {
    pub fn new(payments: Arc<dyn PaymentStore>) -> Self {
        Self { payments }
    }

    /// Every payment, ordered by id.
    pub async fn list_payments(&self) -> Result<Vec<PendingPayment>> {
        Ok(self.payments.list().await?)
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Option<PendingPayment>> {
        Ok(self.payments.get(id).await?)
    }

    /// The most recently created payment for an item and quantity.
    pub async fn latest_payment_for(
        &self,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<Option<PendingPayment>> {
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                CheckoutError::InvalidRequest(format!("quantity must be positive, got {quantity}"))
            })?;
        Ok(self.payments.latest_for_item(item_id, quantity).await?)
    }
}

/// Stock inspection and restocking.
#[derive(Clone)]
pub struct StockAdmin {
    ledger: Arc<dyn StockLedger>,
}

impl StockAdmin {
    pub fn new(ledger: Arc<dyn StockLedger>) -> Self {
        Self { ledger }
    }

    pub async fn get_stock(&self, item_id: ItemId) -> Result<StockRecord> {
        self.ledger
            .get_record(item_id)
            .await
            .map_err(|e| map_ledger_error(item_id, e))
    }

    /// Overwrites the available quantity of an existing record.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, item_id: ItemId, quantity: i64) -> Result<StockRecord> {
        let record = self
            .ledger
            .set_available(item_id, quantity)
            .await
            .map_err(|e| map_ledger_error(item_id, e))?;
        tracing::info!(available = record.available, "stock level set");
        Ok(record)
    }
}

fn map_ledger_error(item_id: ItemId, e: StoreError) -> CheckoutError {
    match e {
        StoreError::StockNotFound(_) => CheckoutError::ItemNotFound(item_id),
        StoreError::InvalidQuantity(q) => {
            CheckoutError::InvalidRequest(format!("stock quantity must be non-negative, got {q}"))
        }
        other => CheckoutError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use common::{ExternalReference, OrderId};
    use domain::{Currency, Money, NewPayment};
    use store::{InMemoryPaymentStore, InMemoryStockLedger};

    use super::*;

    fn new_payment(reference: &str, quantity: u32) -> NewPayment {
        NewPayment {
            item_id: ItemId::new(1),
            quantity,
            amount: Money::from_cents(500 * i64::from(quantity)),
            currency: Currency::usd(),
            order_id: OrderId::new(format!("ord-{reference}")),
            external_reference: ExternalReference::new(reference),
        }
    }

    #[tokio::test]
    async fn test_latest_payment_for() {
        let store = Arc::new(InMemoryPaymentStore::new());
        store.insert(new_payment("cs_1", 2)).await.unwrap();
        store.insert(new_payment("cs_2", 2)).await.unwrap();
        store.insert(new_payment("cs_3", 1)).await.unwrap();
        let queries = PaymentQueries::new(store);

        let latest = queries
            .latest_payment_for(ItemId::new(1), 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.external_reference.as_str(), "cs_2");

        assert!(
            queries
                .latest_payment_for(ItemId::new(9), 2)
                .await
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            queries.latest_payment_for(ItemId::new(1), 0).await,
            Err(CheckoutError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let first = store.insert(new_payment("cs_1", 1)).await.unwrap();
        store.insert(new_payment("cs_2", 1)).await.unwrap();
        let queries = PaymentQueries::new(store);

        assert_eq!(queries.list_payments().await.unwrap().len(), 2);
        assert_eq!(queries.get_payment(first.id).await.unwrap(), Some(first));
        assert!(
            queries
                .get_payment(PaymentId::new(99))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_stock_admin_maps_errors() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        ledger.insert(ItemId::new(1), 4).await;
        let admin = StockAdmin::new(ledger);

        assert_eq!(admin.get_stock(ItemId::new(1)).await.unwrap().available, 4);
        assert_eq!(
            admin.set_stock(ItemId::new(1), 10).await.unwrap().available,
            10
        );
        assert!(matches!(
            admin.get_stock(ItemId::new(2)).await,
            Err(CheckoutError::ItemNotFound(id)) if id == ItemId::new(2)
        ));
        assert!(matches!(
            admin.set_stock(ItemId::new(1), -1).await,
            Err(CheckoutError::InvalidRequest(_))
        ));
    }
}

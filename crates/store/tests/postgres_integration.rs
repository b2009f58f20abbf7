//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{ExternalReference, ItemId, OrderId};
use domain::{Currency, Item, Money, NewPayment, PaymentOutcome, PaymentStatus};
use futures_util::future::join_all;
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CatalogStore, PaymentLookup, PaymentStore, PaymentStoreExt, PostgresStore, Settlement,
    SettlementStore, StockLedger, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE payments, stock, items RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

async fn seed_item(store: &PostgresStore, id: i64, available: u32) -> Item {
    let item = Item::new(id, "Widget", "A widget", Money::from_cents(1250)).unwrap();
    store.register_item(&item, available).await.unwrap();
    item
}

fn new_payment(n: u32, item_id: i64, quantity: u32) -> NewPayment {
    NewPayment {
        item_id: ItemId::new(item_id),
        quantity,
        amount: Money::from_cents(1250 * i64::from(quantity)),
        currency: Currency::usd(),
        order_id: OrderId::new(format!("ord-{n}")),
        external_reference: ExternalReference::new(format!("cs_{n}")),
    }
}

#[tokio::test]
#[serial]
async fn catalog_lookup() {
    let store = get_test_store().await;
    let item = seed_item(&store, 1, 5).await;

    assert_eq!(store.get_item(ItemId::new(1)).await.unwrap(), Some(item));
    assert_eq!(store.get_item(ItemId::new(2)).await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn decrement_and_shortfall() {
    let store = get_test_store().await;
    seed_item(&store, 1, 5).await;

    let record = store.try_decrement(ItemId::new(1), 3).await.unwrap();
    assert_eq!(record.available, 2);

    let err = store.try_decrement(ItemId::new(1), 3).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock {
            requested: 3,
            available: 2,
            ..
        }
    ));
    assert_eq!(store.get_available(ItemId::new(1)).await.unwrap(), 2);
}

#[tokio::test]
#[serial]
async fn decrement_missing_stock_record() {
    let store = get_test_store().await;
    let err = store.try_decrement(ItemId::new(42), 1).await.unwrap_err();
    assert!(matches!(err, StoreError::StockNotFound(_)));
}

#[tokio::test]
#[serial]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;
    seed_item(&store, 1, 7).await;

    let attempts = (0..20).map(|_| {
        let store = store.clone();
        async move { store.try_decrement(ItemId::new(1), 1).await.is_ok() }
    });
    let results = join_all(attempts).await;

    assert_eq!(results.iter().filter(|ok| **ok).count(), 7);
    assert_eq!(store.get_available(ItemId::new(1)).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn set_available_validates_and_updates() {
    let store = get_test_store().await;
    seed_item(&store, 1, 5).await;

    assert!(matches!(
        store.set_available(ItemId::new(1), -3).await,
        Err(StoreError::InvalidQuantity(-3))
    ));

    let before = store.get_record(ItemId::new(1)).await.unwrap();
    let after = store.set_available(ItemId::new(1), 12).await.unwrap();
    assert_eq!(after.available, 12);
    assert!(after.last_updated >= before.last_updated);

    assert!(matches!(
        store.set_available(ItemId::new(9), 1).await,
        Err(StoreError::StockNotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn insert_and_find_payment() {
    let store = get_test_store().await;
    let payment = store.insert(new_payment(1, 1, 2)).await.unwrap();

    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Money::from_cents(2500));
    assert!(payment.settled_at.is_none());

    let by_id = store.get(payment.id).await.unwrap();
    let by_ref = store
        .find_by_reference(&ExternalReference::new("cs_1"))
        .await
        .unwrap();
    let by_order = store.find_by_order(&OrderId::new("ord-1")).await.unwrap();

    assert_eq!(by_id, Some(payment.clone()));
    assert_eq!(by_ref, Some(payment.clone()));
    assert_eq!(by_order, Some(payment));
}

#[tokio::test]
#[serial]
async fn insert_rejects_duplicate_keys() {
    let store = get_test_store().await;
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

    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn settle_applies_once() {
    let store = get_test_store().await;
    seed_item(&store, 1, 5).await;
    store.insert(new_payment(1, 1, 1)).await.unwrap();
    let lookup = PaymentLookup::Reference(ExternalReference::new("cs_1"));

    let first = store.settle(&lookup, PaymentOutcome::Failed).await.unwrap();
    let Settlement::Declined(payment) = first else {
        panic!("expected Declined, got {first:?}");
    };
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.settled_at.is_some());

    let second = store.settle(&lookup, PaymentOutcome::Success).await.unwrap();
    assert!(
        matches!(second, Settlement::AlreadyTerminal(ref p) if p.status == PaymentStatus::Failed)
    );
    assert_eq!(store.get_available(ItemId::new(1)).await.unwrap(), 5);

    let missing = store
        .settle(
            &PaymentLookup::Order(OrderId::new("nope")),
            PaymentOutcome::Success,
        )
        .await
        .unwrap();
    assert_eq!(missing, Settlement::NotFound);
}

#[tokio::test]
#[serial]
async fn settle_success_decrements_in_same_unit() {
    let store = get_test_store().await;
    seed_item(&store, 1, 5).await;
    let payment = store.insert(new_payment(1, 1, 3)).await.unwrap();

    let result = store
        .settle(&PaymentLookup::Id(payment.id), PaymentOutcome::Success)
        .await
        .unwrap();
    let Settlement::Settled { payment, stock } = result else {
        panic!("expected Settled, got {result:?}");
    };
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(stock.available, 2);
    assert_eq!(store.get_available(ItemId::new(1)).await.unwrap(), 2);
}

#[tokio::test]
#[serial]
async fn settle_shortfall_commits_success_status() {
    let store = get_test_store().await;
    seed_item(&store, 1, 1).await;
    let payment = store.insert(new_payment(1, 1, 2)).await.unwrap();
    // Item 9 has no stock record at all.
    let orphan = store.insert(new_payment(2, 9, 1)).await.unwrap();

    let result = store
        .settle(&PaymentLookup::Id(payment.id), PaymentOutcome::Success)
        .await
        .unwrap();
    assert!(matches!(result, Settlement::Shortfall { available: 1, .. }));

    let result = store
        .settle(&PaymentLookup::Id(orphan.id), PaymentOutcome::Success)
        .await
        .unwrap();
    assert!(matches!(result, Settlement::Shortfall { available: 0, .. }));

    for id in [payment.id, orphan.id] {
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
    }
    assert_eq!(store.get_available(ItemId::new(1)).await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn settle_rolls_back_when_stock_update_fails() {
    let store = get_test_store().await;
    seed_item(&store, 1, 5).await;
    store.insert(new_payment(1, 1, 2)).await.unwrap();
    let lookup = PaymentLookup::Reference(ExternalReference::new("cs_1"));

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION reject_stock_update() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'stock unavailable';
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(store.pool())
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_stock_update BEFORE UPDATE ON stock \
         FOR EACH ROW EXECUTE FUNCTION reject_stock_update()",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let result = store.settle(&lookup, PaymentOutcome::Success).await;

    sqlx::query("DROP TRIGGER reject_stock_update ON stock")
        .execute(store.pool())
        .await
        .unwrap();

    assert!(matches!(result, Err(StoreError::Database(_))));
    let stored = store.find(&lookup).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(stored.settled_at.is_none());
    assert_eq!(store.get_available(ItemId::new(1)).await.unwrap(), 5);

    // A redelivery now settles normally.
    let retried = store.settle(&lookup, PaymentOutcome::Success).await.unwrap();
    assert!(matches!(retried, Settlement::Settled { .. }));
    assert_eq!(store.get_available(ItemId::new(1)).await.unwrap(), 3);
}

#[tokio::test]
#[serial]
async fn concurrent_settlements_apply_once() {
    let store = get_test_store().await;
    seed_item(&store, 1, 1).await;
    store.insert(new_payment(1, 1, 1)).await.unwrap();

    let deliveries = (0..10).map(|_| {
        let store = store.clone();
        async move {
            store
                .settle(
                    &PaymentLookup::Order(OrderId::new("ord-1")),
                    PaymentOutcome::Success,
                )
                .await
                .unwrap()
        }
    });
    let results = join_all(deliveries).await;

    let settled = results
        .iter()
        .filter(|s| matches!(s, Settlement::Settled { .. }))
        .count();
    let duplicates = results
        .iter()
        .filter(|s| matches!(s, Settlement::AlreadyTerminal(_)))
        .count();
    assert_eq!(settled, 1);
    assert_eq!(duplicates, 9);
    assert_eq!(store.get_available(ItemId::new(1)).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn latest_for_item_and_list_ordering() {
    let store = get_test_store().await;
    store.insert(new_payment(1, 1, 2)).await.unwrap();
    store.insert(new_payment(2, 1, 3)).await.unwrap();
    let newest = store.insert(new_payment(3, 1, 2)).await.unwrap();

    let latest = store.latest_for_item(ItemId::new(1), 2).await.unwrap();
    assert_eq!(latest.map(|p| p.id), Some(newest.id));
    assert!(
        store
            .latest_for_item(ItemId::new(1), 9)
            .await
            .unwrap()
            .is_none()
    );

    let ids: Vec<i64> = store
        .list()
        .await
        .unwrap()
        .iter()
        .map(|p| p.id.as_i64())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

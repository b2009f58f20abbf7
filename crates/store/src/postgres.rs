use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ExternalReference, ItemId, OrderId, PaymentId};
use domain::{
    Currency, Item, Money, NewPayment, PaymentOutcome, PaymentStatus, PendingPayment, StockRecord,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use crate::{
    Result, StoreError,
    store::{CatalogStore, PaymentLookup, PaymentStore, Settlement, SettlementStore, StockLedger},
};

const DECREMENT_STOCK: &str = r#"
    UPDATE stock
    SET available_quantity = available_quantity - $2, last_updated = NOW()
    WHERE item_id = $1 AND available_quantity >= $2
    RETURNING item_id, available_quantity, last_updated
"#;

const PAYMENT_COLUMNS: &str = "id, item_id, quantity, amount_cents, currency, order_id, \
     external_reference, status, created_at, settled_at";

/// PostgreSQL-backed implementation of every store trait.
///
/// Stock decrements are single conditional `UPDATE ... RETURNING`
/// statements. A settlement runs the payment's conditional status update and
/// the stock decrement in one transaction, locking the payment row before the
/// stock row.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::debug!("database migrations applied");
        Ok(())
    }

    /// Inserts a catalog item together with its stock record.
    ///
    /// Catalog management lives outside the engine; this exists for seeding.
    pub async fn register_item(&self, item: &Item, available: u32) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO items (id, name, description, unit_price_cents)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                unit_price_cents = EXCLUDED.unit_price_cents
            "#,
        )
        .bind(item.id.as_i64())
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.unit_price.cents())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO stock (item_id, available_quantity, last_updated)
            VALUES ($1, $2, NOW())
            ON CONFLICT (item_id) DO UPDATE SET
                available_quantity = EXCLUDED.available_quantity,
                last_updated = NOW()
            "#,
        )
        .bind(item.id.as_i64())
        .bind(i64::from(available))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    fn row_to_stock(row: PgRow) -> Result<StockRecord> {
        let available: i64 = row.try_get("available_quantity")?;
        Ok(StockRecord {
            item_id: ItemId::new(row.try_get("item_id")?),
            available: u32::try_from(available)
                .map_err(|_| StoreError::CorruptRow(format!("stock quantity {available}")))?,
            last_updated: row.try_get::<DateTime<Utc>, _>("last_updated")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<PendingPayment> {
        let quantity: i64 = row.try_get("quantity")?;
        let currency: String = row.try_get("currency")?;
        let status: String = row.try_get("status")?;

        Ok(PendingPayment {
            id: PaymentId::new(row.try_get("id")?),
            item_id: ItemId::new(row.try_get("item_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::CorruptRow(format!("payment quantity {quantity}")))?,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: Currency::parse(&currency)
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?,
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            external_reference: ExternalReference::new(
                row.try_get::<String, _>("external_reference")?,
            ),
            status: status
                .parse::<PaymentStatus>()
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?,
            created_at: row.try_get("created_at")?,
            settled_at: row.try_get("settled_at")?,
        })
    }

    fn lookup_clause(lookup: &PaymentLookup) -> &'static str {
        match lookup {
            PaymentLookup::Id(_) => "id = $1",
            PaymentLookup::Reference(_) => "external_reference = $1",
            PaymentLookup::Order(_) => "order_id = $1",
        }
    }

    fn bind_lookup<'q>(
        query: Query<'q, Postgres, PgArguments>,
        lookup: &'q PaymentLookup,
    ) -> Query<'q, Postgres, PgArguments> {
        match lookup {
            PaymentLookup::Id(id) => query.bind(id.as_i64()),
            PaymentLookup::Reference(reference) => query.bind(reference.as_str()),
            PaymentLookup::Order(order_id) => query.bind(order_id.as_str()),
        }
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, description, unit_price_cents
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Item {
                id: ItemId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StockLedger for PostgresStore {
    async fn get_record(&self, item_id: ItemId) -> Result<StockRecord> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT item_id, available_quantity, last_updated FROM stock WHERE item_id = $1",
        )
        .bind(item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_stock(row),
            None => Err(StoreError::StockNotFound(item_id)),
        }
    }

    async fn try_decrement(&self, item_id: ItemId, quantity: u32) -> Result<StockRecord> {
        let row: Option<PgRow> = sqlx::query(DECREMENT_STOCK)
            .bind(item_id.as_i64())
            .bind(i64::from(quantity))
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Self::row_to_stock(row);
        }

        // Guard did not match: either there is no record or not enough stock.
        let current = self.get_record(item_id).await?;
        Err(StoreError::InsufficientStock {
            item_id,
            requested: quantity,
            available: current.available,
        })
    }

    async fn set_available(&self, item_id: ItemId, quantity: i64) -> Result<StockRecord> {
        if u32::try_from(quantity).is_err() {
            return Err(StoreError::InvalidQuantity(quantity));
        }

        let row: Option<PgRow> = sqlx::query(
            r#"
            UPDATE stock
            SET available_quantity = $2, last_updated = NOW()
            WHERE item_id = $1
            RETURNING item_id, available_quantity, last_updated
            "#,
        )
        .bind(item_id.as_i64())
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_stock(row),
            None => Err(StoreError::StockNotFound(item_id)),
        }
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn insert(&self, payment: NewPayment) -> Result<PendingPayment> {
        let sql = format!(
            r#"
            INSERT INTO payments (item_id, quantity, amount_cents, currency, order_id, external_reference, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING')
            RETURNING {PAYMENT_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(payment.item_id.as_i64())
            .bind(i64::from(payment.quantity))
            .bind(payment.amount.cents())
            .bind(payment.currency.as_str())
            .bind(payment.order_id.as_str())
            .bind(payment.external_reference.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    match db_err.constraint() {
                        Some("unique_external_reference") => {
                            return StoreError::DuplicateReference(
                                payment.external_reference.clone(),
                            );
                        }
                        Some("unique_order_id") => {
                            return StoreError::DuplicateOrder(payment.order_id.clone());
                        }
                        _ => {}
                    }
                }
                StoreError::Database(e)
            })?;

        Self::row_to_payment(row)
    }

    async fn find(&self, lookup: &PaymentLookup) -> Result<Option<PendingPayment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE {}",
            Self::lookup_clause(lookup)
        );

        let row = Self::bind_lookup(sqlx::query(&sql), lookup)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn latest_for_item(
        &self,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<Option<PendingPayment>> {
        let sql = format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE item_id = $1 AND quantity = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query(&sql)
            .bind(item_id.as_i64())
            .bind(i64::from(quantity))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list(&self) -> Result<Vec<PendingPayment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_payment).collect()
    }
}

#[async_trait]
impl SettlementStore for PostgresStore {
    async fn settle(
        &self,
        lookup: &PaymentLookup,
        outcome: PaymentOutcome,
    ) -> Result<Settlement> {
        let sql = format!(
            r#"
            UPDATE payments
            SET status = $2, settled_at = NOW()
            WHERE {} AND status = 'PENDING'
            RETURNING {PAYMENT_COLUMNS}
            "#,
            Self::lookup_clause(lookup)
        );

        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;

        let row = Self::bind_lookup(sqlx::query(&sql), lookup)
            .bind(outcome.status().as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return match self.find(lookup).await? {
                Some(payment) => Ok(Settlement::AlreadyTerminal(payment)),
                None => Ok(Settlement::NotFound),
            };
        };
        let payment = Self::row_to_payment(row)?;

        if outcome == PaymentOutcome::Failed {
            tx.commit().await?;
            return Ok(Settlement::Declined(payment));
        }

        let stock_row: Option<PgRow> = sqlx::query(DECREMENT_STOCK)
            .bind(payment.item_id.as_i64())
            .bind(i64::from(payment.quantity))
            .fetch_optional(&mut *tx)
            .await?;

        let settlement = match stock_row {
            Some(row) => Settlement::Settled {
                payment,
                stock: Self::row_to_stock(row)?,
            },
            None => {
                let available: Option<i64> =
                    sqlx::query_scalar("SELECT available_quantity FROM stock WHERE item_id = $1")
                        .bind(payment.item_id.as_i64())
                        .fetch_optional(&mut *tx)
                        .await?;
                let available = match available {
                    Some(n) => u32::try_from(n)
                        .map_err(|_| StoreError::CorruptRow(format!("stock quantity {n}")))?,
                    None => 0,
                };
                Settlement::Shortfall { payment, available }
            }
        };

        tx.commit().await?;
        Ok(settlement)
    }
}

//! Startup wiring: backends, gateway and catalog seed.

use std::path::Path;
use std::sync::Arc;

use checkout::{
    CheckoutGateway, GatewayError, InMemoryCheckoutGateway, LogAlerter, StripeCheckoutGateway,
};
use domain::{DomainError, Item, Money};
use serde::Deserialize;
use store::{
    CatalogStore, InMemoryCatalog, InMemoryPaymentStore, InMemorySettlement, InMemoryStockLedger,
    PaymentStore, PostgresStore, SettlementStore, StockLedger, StoreError,
};
use thiserror::Error;

use crate::AppState;
use crate::config::Config;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Failed to read catalog seed {path}: {source}")]
    SeedIo {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid catalog seed: {0}")]
    SeedFormat(#[from] serde_json::Error),

    #[error("Invalid catalog item: {0}")]
    SeedItem(#[from] DomainError),
}

/// One catalog entry with its opening stock.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSeed {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub unit_price_cents: i64,
    pub available_quantity: u32,
}

impl CatalogSeed {
    pub fn to_item(&self) -> Result<Item, DomainError> {
        Item::new(
            self.id,
            self.name.clone(),
            self.description.clone(),
            Money::from_cents(self.unit_price_cents),
        )
    }
}

/// Parses a JSON array of catalog entries.
pub fn parse_seed(json: &str) -> Result<Vec<CatalogSeed>, BootstrapError> {
    let seed: Vec<CatalogSeed> = serde_json::from_str(json)?;
    // Validate every entry before anything is written
    for entry in &seed {
        entry.to_item()?;
    }
    Ok(seed)
}

async fn load_seed(path: &Path) -> Result<Vec<CatalogSeed>, BootstrapError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BootstrapError::SeedIo {
            path: path.display().to_string(),
            source,
        })?;
    parse_seed(&json)
}

/// The stores behind the checkout services.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn StockLedger>,
    pub payments: Arc<dyn PaymentStore>,
    /// Must write to the same payments and ledger as the fields above.
    pub settlements: Arc<dyn SettlementStore>,
}

/// In-memory stores pre-loaded with `seed`.
pub async fn in_memory_stores(seed: &[CatalogSeed]) -> Result<Stores, BootstrapError> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let ledger = Arc::new(InMemoryStockLedger::new());
    for entry in seed {
        let item = entry.to_item()?;
        ledger.insert(item.id, entry.available_quantity).await;
        catalog.insert(item).await;
    }
    let payments = InMemoryPaymentStore::new();
    let settlements = InMemorySettlement::new(payments.clone(), ledger.clone());
    Ok(Stores {
        catalog,
        ledger,
        payments: Arc::new(payments),
        settlements: Arc::new(settlements),
    })
}

/// PostgreSQL stores over one pool; migrates and upserts `seed`.
pub async fn postgres_stores(
    database_url: &str,
    seed: &[CatalogSeed],
) -> Result<Stores, BootstrapError> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    let store = PostgresStore::new(pool);
    store.run_migrations().await?;
    for entry in seed {
        store
            .register_item(&entry.to_item()?, entry.available_quantity)
            .await?;
    }

    let store = Arc::new(store);
    Ok(Stores {
        catalog: store.clone(),
        ledger: store.clone(),
        payments: store.clone(),
        settlements: store,
    })
}

/// Stripe when an API key is configured, otherwise the in-memory gateway.
pub fn gateway(config: &Config) -> Result<Arc<dyn CheckoutGateway>, BootstrapError> {
    if config.stripe_api_key.is_some() {
        let gateway = StripeCheckoutGateway::new(Arc::new(config.gateway_config()))?;
        tracing::info!(api_base = %config.stripe_api_base, "using Stripe checkout gateway");
        Ok(Arc::new(gateway))
    } else {
        tracing::warn!("STRIPE_API_KEY not set, using in-memory checkout gateway");
        Ok(Arc::new(InMemoryCheckoutGateway::new()))
    }
}

/// Builds the application state described by `config`.
pub async fn create_state(config: &Config) -> Result<Arc<AppState>, BootstrapError> {
    let seed = match &config.catalog_seed_file {
        Some(path) => load_seed(path).await?,
        None => Vec::new(),
    };

    let stores = match &config.database_url {
        Some(url) => {
            tracing::info!("using PostgreSQL stores");
            postgres_stores(url, &seed).await?
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stores");
            in_memory_stores(&seed).await?
        }
    };
    tracing::info!(items = seed.len(), "catalog seeded");

    if config.webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, webhook deliveries will be rejected");
    }

    Ok(Arc::new(AppState::new(
        stores,
        gateway(config)?,
        Arc::new(LogAlerter),
        config,
    )))
}

#[cfg(test)]
mod tests {
    use common::ItemId;

    use super::*;

    #[test]
    fn test_parse_seed() {
        let seed = parse_seed(
            r#"[
                {"id": 1, "name": "Widget", "description": "Blue", "unit_price_cents": 1250, "available_quantity": 5},
                {"id": 2, "name": "Gadget", "unit_price_cents": 990, "available_quantity": 0}
            ]"#,
        )
        .unwrap();

        assert_eq!(seed.len(), 2);
        assert_eq!(seed[1].description, "");
        assert_eq!(seed[0].to_item().unwrap().unit_price, Money::from_cents(1250));
    }

    #[test]
    fn test_parse_seed_rejects_bad_entries() {
        assert!(matches!(
            parse_seed(r#"[{"id": 1, "name": "Free", "unit_price_cents": 0, "available_quantity": 1}]"#),
            Err(BootstrapError::SeedItem(_))
        ));
        assert!(matches!(
            parse_seed(r#"[{"id": 1, "name": "Neg", "unit_price_cents": 10, "available_quantity": -1}]"#),
            Err(BootstrapError::SeedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_stores_are_seeded() {
        let seed = parse_seed(
            r#"[{"id": 3, "name": "Widget", "unit_price_cents": 100, "available_quantity": 7}]"#,
        )
        .unwrap();
        let stores = in_memory_stores(&seed).await.unwrap();

        assert!(stores.catalog.get_item(ItemId::new(3)).await.unwrap().is_some());
        assert_eq!(stores.ledger.get_available(ItemId::new(3)).await.unwrap(), 7);
    }

    #[test]
    fn test_gateway_selection() {
        assert!(gateway(&Config::default()).is_ok());

        let config = Config {
            stripe_api_key: Some("sk_test_1".to_string()),
            ..Config::default()
        };
        assert!(gateway(&config).is_ok());
    }
}

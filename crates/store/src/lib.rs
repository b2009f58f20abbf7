//! Persistence for the checkout engine.
//!
//! Three stores sit behind traits so the services never see a backend:
//! - `CatalogStore`: read-only item lookup
//! - `StockLedger`: per-item available quantity with an atomic decrement
//! - `PaymentStore`: append-only payment records
//! - `SettlementStore`: the status compare-and-set and its stock decrement,
//!   applied together
//!
//! Each has an in-memory implementation and a PostgreSQL one.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryCatalog, InMemoryPaymentStore, InMemorySettlement, InMemoryStockLedger};
pub use postgres::PostgresStore;
pub use store::{
    CatalogStore, PaymentLookup, PaymentStore, PaymentStoreExt, Settlement, SettlementStore,
    StockLedger,
};

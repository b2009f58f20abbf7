use common::{ExternalReference, ItemId, OrderId};
use thiserror::Error;

/// Errors that can occur when interacting with a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No stock record exists for the item.
    #[error("Stock record not found for item {0}")]
    StockNotFound(ItemId),

    /// The ledger holds less than the requested quantity.
    /// No change was made.
    #[error(
        "Insufficient stock for item {item_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        item_id: ItemId,
        requested: u32,
        available: u32,
    },

    /// Stock quantities must be non-negative and fit in a `u32`.
    #[error("Invalid stock quantity: {0}")]
    InvalidQuantity(i64),

    /// A payment with this external reference already exists.
    #[error("Duplicate external reference: {0}")]
    DuplicateReference(ExternalReference),

    /// A payment with this order id already exists.
    #[error("Duplicate order id: {0}")]
    DuplicateOrder(OrderId),

    /// A persisted row could not be mapped back to a domain record.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

//! Catalog items and their stock records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DomainError, ItemId, Money};

/// A purchasable catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    /// Price per unit, always positive.
    pub unit_price: Money,
}

impl Item {
    /// Creates an item, rejecting non-positive prices.
    pub fn new(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        description: impl Into<String>,
        unit_price: Money,
    ) -> Result<Self, DomainError> {
        if !unit_price.is_positive() {
            return Err(DomainError::InvalidPrice {
                cents: unit_price.cents(),
            });
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            unit_price,
        })
    }

    /// Total price for `quantity` units.
    pub fn price_for(&self, quantity: u32) -> Result<Money, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity: 0 });
        }
        self.unit_price
            .checked_multiply(quantity)
            .ok_or(DomainError::AmountOverflow {
                unit_cents: self.unit_price.cents(),
                quantity,
            })
    }
}

/// Available quantity of a single item.
///
/// The quantity is unsigned, so it can never go negative; every mutation
/// refreshes `last_updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub item_id: ItemId,
    pub available: u32,
    pub last_updated: DateTime<Utc>,
}

impl StockRecord {
    pub fn new(item_id: ItemId, available: u32) -> Self {
        Self {
            item_id,
            available,
            last_updated: Utc::now(),
        }
    }

    /// Subtracts `quantity` if enough is available.
    ///
    /// Leaves the record untouched and returns false otherwise.
    pub fn try_take(&mut self, quantity: u32) -> bool {
        match self.available.checked_sub(quantity) {
            Some(remaining) => {
                self.available = remaining;
                self.last_updated = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Overwrites the available quantity.
    pub fn set(&mut self, available: u32) {
        self.available = available;
        self.last_updated = Utc::now();
    }
}

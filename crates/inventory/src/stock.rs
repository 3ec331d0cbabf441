use serde::{Deserialize, Serialize};

use storeops_core::{DomainError, DomainResult};

/// A non-zero signed adjustment of a product's on-hand quantity.
///
/// Positive deltas come from supplies, negative ones from sales.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct StockDelta(i64);

impl StockDelta {
    pub fn new(delta: i64) -> DomainResult<Self> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        Ok(Self(delta))
    }

    /// Delta for `quantity` units received.
    pub fn increase(quantity: i64) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(Self(quantity))
    }

    /// Delta for `quantity` units taken out of stock.
    pub fn decrease(quantity: i64) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        // quantity > 0, so negation cannot overflow.
        Ok(Self(-quantity))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn is_decrease(self) -> bool {
        self.0 < 0
    }

    /// Units requested by a decrease (0 for increases).
    pub fn requested(self) -> i64 {
        if self.0 < 0 { -self.0 } else { 0 }
    }
}

impl TryFrom<i64> for StockDelta {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        StockDelta::new(value)
    }
}

impl From<StockDelta> for i64 {
    fn from(value: StockDelta) -> Self {
        value.0
    }
}

/// Apply `delta` to `current`, refusing any result below zero.
pub fn apply_delta(current: i64, delta: StockDelta) -> DomainResult<i64> {
    let next = current
        .checked_add(delta.get())
        .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
    if next < 0 {
        return Err(DomainError::insufficient_stock(current, delta.requested()));
    }
    Ok(next)
}

/// Low-stock predicate (inclusive boundary).
pub fn is_low_stock(current_qty: i64, min_threshold: i64) -> bool {
    current_qty <= min_threshold
}

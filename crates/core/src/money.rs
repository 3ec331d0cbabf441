//! Monetary amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A non-negative, exact decimal amount (prices, totals, costs) with at most
/// [`Money::MAX_SCALE`] fractional digits.
///
/// Arithmetic is checked; overflow surfaces as a validation error instead of
/// wrapping. Deserialization goes through [`Money::new`], so a negative amount
/// can never be constructed from input.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Fractional digits kept by stored amounts (`NUMERIC(12, 2)`).
    pub const MAX_SCALE: u32 = 2;

    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation(format!(
                "amount cannot be negative (got {amount})"
            )));
        }
        let amount = amount.normalize();
        if amount.scale() > Self::MAX_SCALE {
            return Err(DomainError::validation(format!(
                "amount {amount} has more than {} decimal places",
                Self::MAX_SCALE
            )));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// `self * quantity`, e.g. unit price times units sold.
    pub fn times(self, quantity: i64) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(|d| Self(d.normalize()))
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Self> {
        self.0
            .checked_add(other.0)
            .map(|d| Self(d.normalize()))
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    /// Exact sum of an iterator of amounts.
    pub fn sum<I>(amounts: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

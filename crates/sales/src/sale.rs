use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeops_core::{DomainError, DomainResult, Entity, Money, Principal, ProductId, SaleId, UserId};

/// A recorded sale. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Server-computed: unit price at sale time times quantity.
    pub total_price: Money,
    pub sale_date: DateTime<Utc>,
    pub cashier_id: UserId,
}

impl Entity for Sale {
    type Id = SaleId;

    fn id(&self) -> SaleId {
        self.id
    }
}

/// Command: CreateSale.
///
/// Carries neither price nor timestamp: the total is derived from the catalog
/// price and the sale date from the server clock when the sale is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSale {
    pub product_id: ProductId,
    pub quantity: i64,
    pub cashier: Principal,
}

impl CreateSale {
    pub fn new(product_id: ProductId, quantity: i64, cashier: Principal) -> Self {
        Self {
            product_id,
            quantity,
            cashier,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be positive (got {})",
                self.quantity
            )));
        }
        Ok(())
    }

    /// Build the sale record priced at `unit_price` and dated `sale_date`.
    pub fn price(
        &self,
        sale_id: SaleId,
        unit_price: Money,
        sale_date: DateTime<Utc>,
    ) -> DomainResult<Sale> {
        self.validate()?;
        Ok(Sale {
            id: sale_id,
            product_id: self.product_id,
            quantity: self.quantity,
            total_price: unit_price.times(self.quantity)?,
            sale_date,
            cashier_id: self.cashier.user_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use storeops_core::Role;

    fn cashier() -> Principal {
        Principal::new(UserId::new(), Role::Cashier)
    }

    #[test]
    fn zero_quantity_fails_validation() {
        let cmd = CreateSale::new(ProductId::new(), 0, cashier());
        assert!(matches!(cmd.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn negative_quantity_fails_validation() {
        let cmd = CreateSale::new(ProductId::new(), -2, cashier());
        assert!(matches!(cmd.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn total_is_unit_price_times_quantity() {
        let who = cashier();
        let cmd = CreateSale::new(ProductId::new(), 3, who);
        let unit = Money::new(dec!(4.25)).unwrap();
        let now = Utc::now();

        let sale = cmd.price(SaleId::new(), unit, now).unwrap();

        assert_eq!(sale.total_price.amount(), dec!(12.75));
        assert_eq!(sale.quantity, 3);
        assert_eq!(sale.cashier_id, who.user_id());
        assert_eq!(sale.sale_date, now);
    }

    #[test]
    fn client_supplied_timestamp_is_not_part_of_the_command() {
        let json = serde_json::json!({
            "product_id": ProductId::new(),
            "quantity": 1,
            "cashier": cashier(),
            "occurred_at": "2001-01-01T00:00:00Z",
        });
        let cmd: CreateSale = serde_json::from_value(json).unwrap();
        let now = Utc::now();
        let sale = cmd
            .price(SaleId::new(), Money::new(dec!(1)).unwrap(), now)
            .unwrap();
        assert_eq!(sale.sale_date, now);
    }

    #[test]
    fn pricing_an_invalid_command_fails() {
        let cmd = CreateSale::new(ProductId::new(), 0, cashier());
        assert!(cmd.price(SaleId::new(), Money::ZERO, Utc::now()).is_err());
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use storeops_core::{DepartmentId, DomainError, DomainResult, Entity, Money, ProductId, SupplierId};

/// Catalog-managed attributes of a product (everything except the stock level).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub department_id: Option<DepartmentId>,
    pub supplier_id: Option<SupplierId>,
    /// Authoritative unit price used when a sale is recorded.
    pub price: Money,
    /// Reorder threshold: the product is low on stock at or below this quantity.
    pub min_threshold: i64,
    /// Quality grade, a single character.
    #[serde(default)]
    pub grade: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub storage_condition: Option<String>,
}

impl ProductDetails {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.min_threshold < 0 {
            return Err(DomainError::validation("min_threshold cannot be negative"));
        }
        if let Some(grade) = &self.grade {
            if grade.chars().count() != 1 {
                return Err(DomainError::validation(
                    "grade must be exactly one character",
                ));
            }
        }
        if let Some(cond) = &self.storage_condition {
            if cond.chars().count() > 20 {
                return Err(DomainError::validation(
                    "storage_condition must be at most 20 characters",
                ));
            }
        }
        Ok(())
    }
}

/// Request to register a product in the catalog with its opening stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(flatten)]
    pub details: ProductDetails,
    pub initial_qty: i64,
}

impl NewProduct {
    pub fn validate(&self) -> DomainResult<()> {
        self.details.validate()?;
        if self.initial_qty < 0 {
            return Err(DomainError::validation("initial_qty cannot be negative"));
        }
        Ok(())
    }

    pub fn into_product(self, id: ProductId) -> DomainResult<Product> {
        self.validate()?;
        Ok(Product::restore(id, self.details, self.initial_qty))
    }
}

/// A catalog product together with its on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    #[serde(flatten)]
    details: ProductDetails,
    current_qty: i64,
}

impl Product {
    /// Rebuild a product from stored state.
    ///
    /// Intended for store adapters; application code obtains products from a store.
    pub fn restore(id: ProductId, details: ProductDetails, current_qty: i64) -> Self {
        Self {
            id,
            details,
            current_qty,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.details.department_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.details.supplier_id
    }

    pub fn price(&self) -> Money {
        self.details.price
    }

    pub fn current_qty(&self) -> i64 {
        self.current_qty
    }

    pub fn min_threshold(&self) -> i64 {
        self.details.min_threshold
    }

    pub fn grade(&self) -> Option<&str> {
        self.details.grade.as_deref()
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        self.details.expiry_date
    }

    pub fn storage_condition(&self) -> Option<&str> {
        self.details.storage_condition.as_deref()
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    /// Replace catalog attributes. The stock level is left untouched.
    pub fn apply_details(&mut self, details: ProductDetails) -> DomainResult<()> {
        details.validate()?;
        self.details = details;
        Ok(())
    }

    /// Copy of this product at a different stock level (store adapters only).
    pub fn with_current_qty(mut self, current_qty: i64) -> Self {
        self.current_qty = current_qty;
        self
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

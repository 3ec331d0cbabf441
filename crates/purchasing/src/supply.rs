use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storeops_core::{
    DomainError, DomainResult, Entity, Money, Principal, ProductId, SupplierId, SupplyId,
    SupplyItemId, UserId,
};

/// One received line of a supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyItem {
    pub id: SupplyItemId,
    pub supply_id: SupplyId,
    /// 1-based position within the supply.
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

impl Entity for SupplyItem {
    type Id = SupplyItemId;

    fn id(&self) -> SupplyItemId {
        self.id
    }
}

/// A recorded supply: header plus its ordered items. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supply {
    pub id: SupplyId,
    pub supplier_id: SupplierId,
    pub supply_date: DateTime<Utc>,
    pub total_cost: Money,
    pub approved_by: UserId,
    pub items: Vec<SupplyItem>,
}

impl Supply {
    /// The header alone (no items attached).
    pub fn header(&self) -> Supply {
        Supply {
            items: Vec::new(),
            ..self.clone()
        }
    }
}

impl Entity for Supply {
    type Id = SupplyId;

    fn id(&self) -> SupplyId {
        self.id
    }
}

/// Client-provided supply header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyHeader {
    pub supplier_id: SupplierId,
    /// Optional declared total; when present it must equal the sum of the lines.
    pub total_cost: Option<Money>,
}

/// Client-provided supply line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Command: CreateSupply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSupply {
    pub header: SupplyHeader,
    pub items: Vec<SupplyLine>,
    pub approver: Principal,
}

impl CreateSupply {
    pub fn new(header: SupplyHeader, items: Vec<SupplyLine>, approver: Principal) -> Self {
        Self {
            header,
            items,
            approver,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation(
                "supply must contain at least one item",
            ));
        }
        for (idx, line) in self.items.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "item {}: quantity must be positive (got {})",
                    idx + 1,
                    line.quantity
                )));
            }
        }

        let computed = self.computed_total()?;
        if let Some(declared) = self.header.total_cost {
            if declared != computed {
                return Err(DomainError::validation(format!(
                    "total_cost {declared} does not match sum of items {computed}"
                )));
            }
        }
        Ok(())
    }

    /// Sum of `quantity * unit_price` over all lines.
    pub fn computed_total(&self) -> DomainResult<Money> {
        self.items.iter().try_fold(Money::ZERO, |acc, line| {
            acc.checked_add(line.unit_price.times(line.quantity)?)
        })
    }

    /// Build the supply record (header + items with fresh ids) dated
    /// `supply_date`, ready to be persisted.
    pub fn plan(&self, supply_id: SupplyId, supply_date: DateTime<Utc>) -> DomainResult<Supply> {
        self.validate()?;

        let items = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                Ok(SupplyItem {
                    id: SupplyItemId::new(),
                    supply_id,
                    line_no: line_number(idx)?,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(Supply {
            id: supply_id,
            supplier_id: self.header.supplier_id,
            supply_date,
            total_cost: self.computed_total()?,
            approved_by: self.approver.user_id(),
            items,
        })
    }
}

/// 1-based line number for the item at `idx`.
fn line_number(idx: usize) -> DomainResult<u32> {
    idx.checked_add(1)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| DomainError::validation(format!("too many items in supply (max {})", u32::MAX)))
}

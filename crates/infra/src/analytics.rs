//! Read-side aggregations over committed product and sale state.
//!
//! Nothing here writes or takes locks that block writers; results may trail
//! concurrently committing transactions.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::instrument;

use storeops_core::{Money, ProductId};
use storeops_inventory::is_low_stock;
use storeops_products::Product;

use crate::error::EngineError;
use crate::store::Store;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Aggregate of the sales recorded within a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub total_sales: u64,
    pub total_revenue: Money,
    pub per_product_quantity: BTreeMap<ProductId, i64>,
}

impl Default for SalesSummary {
    fn default() -> Self {
        Self {
            total_sales: 0,
            total_revenue: Money::ZERO,
            per_product_quantity: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default, Copy, Clone)]
pub struct AnalyticsAggregator;

impl AnalyticsAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Products at or below their reorder threshold, ordered by identity.
    #[instrument(skip(self, store))]
    pub async fn low_stock(&self, store: &dyn Store) -> Result<Vec<Product>, EngineError> {
        let mut products: Vec<Product> = store
            .list_products()
            .await?
            .into_iter()
            .filter(|p| is_low_stock(p.current_qty(), p.min_threshold()))
            .collect();
        products.sort_by_key(|p| p.id_typed());
        Ok(products)
    }

    /// Summarize sales dated `start..=end` (`YYYY-MM-DD`, UTC calendar days).
    #[instrument(skip(self, store))]
    pub async fn sales_summary(
        &self,
        store: &dyn Store,
        start: &str,
        end: &str,
    ) -> Result<SalesSummary, EngineError> {
        let (from, until) = day_bounds(start, end)?;
        let sales = store.sales_between(from, until).await?;

        let mut per_product_quantity = BTreeMap::new();
        for sale in &sales {
            *per_product_quantity.entry(sale.product_id).or_insert(0) += sale.quantity;
        }
        Ok(SalesSummary {
            total_sales: sales.len() as u64,
            total_revenue: Money::sum(sales.iter().map(|s| s.total_price))?,
            per_product_quantity,
        })
    }
}

fn parse_date(label: &str, raw: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| {
        EngineError::InvalidRange(format!("{label} date '{raw}' is not YYYY-MM-DD: {e}"))
    })
}

/// Half-open UTC interval `[start 00:00, day after end 00:00)`.
fn day_bounds(start: &str, end: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), EngineError> {
    let start = parse_date("start", start)?;
    let end = parse_date("end", end)?;
    if start > end {
        return Err(EngineError::InvalidRange(format!(
            "start {start} is after end {end}"
        )));
    }

    let after_end = end
        .checked_add_days(Days::new(1))
        .ok_or_else(|| EngineError::InvalidRange(format!("end {end} is out of range")))?;
    let from = start.and_time(chrono::NaiveTime::MIN).and_utc();
    let until = after_end.and_time(chrono::NaiveTime::MIN).and_utc();
    Ok((from, until))
}

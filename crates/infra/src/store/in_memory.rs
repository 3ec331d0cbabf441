use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use storeops_core::{Entity, ProductId, SaleId, SupplyId, SupplyItemId};
use storeops_products::Product;
use storeops_purchasing::{Supply, SupplyItem};
use storeops_sales::Sale;

use super::{Store, StoreError, StoreTx, finished_error};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    sales: BTreeMap<SaleId, Sale>,
    /// Supply headers; items live in `supply_items`.
    supplies: BTreeMap<SupplyId, Supply>,
    supply_items: BTreeMap<SupplyItemId, SupplyItem>,
}

impl Tables {
    fn supply_with_items(&self, id: SupplyId) -> Option<Supply> {
        let mut supply = self.supplies.get(&id)?.clone();
        let mut items: Vec<SupplyItem> = self
            .supply_items
            .values()
            .filter(|item| item.supply_id == id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.line_no);
        supply.items = items;
        Some(supply)
    }
}

/// In-memory transactional store.
///
/// Intended for tests/dev. Not optimized for performance.
///
/// Transactions stage their writes locally and apply them under the table write
/// lock at commit. Stock increments are checked against the predicate twice:
/// once when issued (so callers see the rejection immediately) and again at
/// commit against the then-committed quantity, so a batch that raced with
/// another committed transaction fails as a whole instead of driving stock
/// negative.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bound how long a commit waits for the table lock before failing with
    /// [`StoreError::Timeout`].
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        read_tables(&self.tables, self.lock_timeout).await
    }
}

async fn read_tables(
    tables: &RwLock<Tables>,
    lock_timeout: Duration,
) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
    tokio::time::timeout(lock_timeout, tables.read())
        .await
        .map_err(|_| StoreError::Timeout(format!("read lock not acquired within {lock_timeout:?}")))
}

async fn write_tables(
    tables: &RwLock<Tables>,
    lock_timeout: Duration,
) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
    tokio::time::timeout(lock_timeout, tables.write())
        .await
        .map_err(|_| StoreError::Timeout(format!("write lock not acquired within {lock_timeout:?}")))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(InMemoryTx {
            tables: Arc::clone(&self.tables),
            lock_timeout: self.lock_timeout,
            writes: Some(Vec::new()),
        }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read().await?.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.read().await?.products.values().cloned().collect())
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        Ok(self.read().await?.sales.get(&id).cloned())
    }

    async fn sales_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError> {
        let tables = self.read().await?;
        let mut sales: Vec<Sale> = tables
            .sales
            .values()
            .filter(|s| s.sale_date >= from && s.sale_date < until)
            .cloned()
            .collect();
        sales.sort_by(|a, b| a.sale_date.cmp(&b.sale_date).then(a.id.cmp(&b.id)));
        Ok(sales)
    }

    async fn get_supply(&self, id: SupplyId) -> Result<Option<Supply>, StoreError> {
        Ok(self.read().await?.supply_with_items(id))
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    InsertProduct(Product),
    UpdateDetails(Product),
    Increment {
        id: ProductId,
        delta: i64,
        at_least: i64,
    },
    InsertSale(Sale),
    InsertSupply(Supply),
    InsertSupplyItem(SupplyItem),
}

/// Transaction handle for [`InMemoryStore`]. `writes` is `None` once finished.
struct InMemoryTx {
    tables: Arc<RwLock<Tables>>,
    lock_timeout: Duration,
    writes: Option<Vec<StagedWrite>>,
}

impl InMemoryTx {
    fn staged(&self) -> Result<&[StagedWrite], StoreError> {
        self.writes.as_deref().ok_or_else(finished_error)
    }

    fn stage(&mut self, write: StagedWrite) -> Result<(), StoreError> {
        self.writes.as_mut().ok_or_else(finished_error)?.push(write);
        Ok(())
    }

    /// Committed row with this transaction's own writes laid over it.
    fn product_view(tables: &Tables, staged: &[StagedWrite], id: ProductId) -> Option<Product> {
        let mut view = tables.products.get(&id).cloned();
        for write in staged {
            match write {
                StagedWrite::InsertProduct(p) if p.id_typed() == id => view = Some(p.clone()),
                StagedWrite::UpdateDetails(p) if p.id_typed() == id => {
                    view = view.map(|v| Product::restore(id, p.details().clone(), v.current_qty()));
                }
                StagedWrite::Increment { id: target, delta, .. } if *target == id => {
                    // Exact overflow is re-checked at commit.
                    view = view.map(|v| {
                        let qty = v.current_qty().saturating_add(*delta);
                        v.with_current_qty(qty)
                    });
                }
                _ => {}
            }
        }
        view
    }

    fn sale_staged(staged: &[StagedWrite], id: SaleId) -> bool {
        staged
            .iter()
            .any(|w| matches!(w, StagedWrite::InsertSale(s) if s.id == id))
    }

    fn supply_staged(staged: &[StagedWrite], id: SupplyId) -> bool {
        staged
            .iter()
            .any(|w| matches!(w, StagedWrite::InsertSupply(s) if s.id == id))
    }

    fn supply_item_staged(staged: &[StagedWrite], id: SupplyItemId) -> bool {
        staged
            .iter()
            .any(|w| matches!(w, StagedWrite::InsertSupplyItem(i) if i.id == id))
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let staged = self.staged()?;
        let tables = read_tables(&self.tables, self.lock_timeout).await?;
        Ok(Self::product_view(&tables, staged, id))
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let id = product.id_typed();
        {
            let staged = self.staged()?;
            let tables = read_tables(&self.tables, self.lock_timeout).await?;
            if Self::product_view(&tables, staged, id).is_some() {
                return Err(StoreError::duplicate("product", id));
            }
        }
        self.stage(StagedWrite::InsertProduct(product.clone()))
    }

    async fn update_product_details(&mut self, product: &Product) -> Result<(), StoreError> {
        let id = product.id_typed();
        {
            let staged = self.staged()?;
            let tables = read_tables(&self.tables, self.lock_timeout).await?;
            if Self::product_view(&tables, staged, id).is_none() {
                return Err(StoreError::not_found("product", id));
            }
        }
        self.stage(StagedWrite::UpdateDetails(product.clone()))
    }

    async fn increment_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        at_least: i64,
    ) -> Result<i64, StoreError> {
        let next = {
            let staged = self.staged()?;
            let tables = read_tables(&self.tables, self.lock_timeout).await?;
            let current = Self::product_view(&tables, staged, id)
                .ok_or_else(|| StoreError::not_found("product", id))?
                .current_qty();
            checked_increment(id, current, delta, at_least)?
        };
        self.stage(StagedWrite::Increment {
            id,
            delta,
            at_least,
        })?;
        Ok(next)
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError> {
        {
            let staged = self.staged()?;
            let tables = read_tables(&self.tables, self.lock_timeout).await?;
            if tables.sales.contains_key(&sale.id) || Self::sale_staged(staged, sale.id) {
                return Err(StoreError::duplicate("sale", sale.id));
            }
            if Self::product_view(&tables, staged, sale.product_id).is_none() {
                return Err(StoreError::not_found("product", sale.product_id));
            }
        }
        self.stage(StagedWrite::InsertSale(sale.clone()))
    }

    async fn insert_supply(&mut self, supply: &Supply) -> Result<(), StoreError> {
        {
            let staged = self.staged()?;
            let tables = read_tables(&self.tables, self.lock_timeout).await?;
            if tables.supplies.contains_key(&supply.id) || Self::supply_staged(staged, supply.id) {
                return Err(StoreError::duplicate("supply", supply.id));
            }
        }
        self.stage(StagedWrite::InsertSupply(supply.header()))
    }

    async fn insert_supply_item(&mut self, item: &SupplyItem) -> Result<(), StoreError> {
        {
            let staged = self.staged()?;
            let tables = read_tables(&self.tables, self.lock_timeout).await?;
            if tables.supply_items.contains_key(&item.id)
                || Self::supply_item_staged(staged, item.id)
            {
                return Err(StoreError::duplicate("supply item", item.id));
            }
            if !tables.supplies.contains_key(&item.supply_id)
                && !Self::supply_staged(staged, item.supply_id)
            {
                return Err(StoreError::not_found("supply", item.supply_id));
            }
            if Self::product_view(&tables, staged, item.product_id).is_none() {
                return Err(StoreError::not_found("product", item.product_id));
            }
        }
        self.stage(StagedWrite::InsertSupplyItem(item.clone()))
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let writes = self.writes.take().ok_or_else(finished_error)?;
        if writes.is_empty() {
            return Ok(());
        }
        let mut tables = write_tables(&self.tables, self.lock_timeout).await?;
        apply(&mut tables, writes)
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.writes.take().ok_or_else(finished_error)?;
        Ok(())
    }
}

fn checked_increment(
    id: ProductId,
    current: i64,
    delta: i64,
    at_least: i64,
) -> Result<i64, StoreError> {
    match current.checked_add(delta) {
        Some(next) if next >= at_least => Ok(next),
        Some(_) => Err(StoreError::PredicateViolated {
            product_id: id,
            current,
            delta,
        }),
        None => Err(StoreError::Backend(format!(
            "stock quantity overflow for product {id}"
        ))),
    }
}

/// Validate every staged write against committed state, then apply them all.
///
/// Nothing in `tables` is touched unless every write validates.
fn apply(tables: &mut Tables, writes: Vec<StagedWrite>) -> Result<(), StoreError> {
    let mut products: BTreeMap<ProductId, Product> = BTreeMap::new();
    let mut sales: Vec<Sale> = Vec::new();
    let mut supplies: Vec<Supply> = Vec::new();
    let mut items: Vec<SupplyItem> = Vec::new();
    let mut sale_ids = BTreeSet::new();
    let mut supply_ids = BTreeSet::new();
    let mut item_ids = BTreeSet::new();

    fn touched<'a>(
        tables: &Tables,
        products: &'a mut BTreeMap<ProductId, Product>,
        id: ProductId,
    ) -> Result<&'a mut Product, StoreError> {
        if !products.contains_key(&id) {
            let committed = tables
                .products
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("product", id))?;
            products.insert(id, committed);
        }
        products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))
    }

    for write in writes {
        match write {
            StagedWrite::InsertProduct(product) => {
                let id = product.id_typed();
                if tables.products.contains_key(&id) || products.contains_key(&id) {
                    return Err(StoreError::duplicate("product", id));
                }
                products.insert(id, product);
            }
            StagedWrite::UpdateDetails(product) => {
                let id = product.id_typed();
                let row = touched(tables, &mut products, id)?;
                *row = Product::restore(id, product.details().clone(), row.current_qty());
            }
            StagedWrite::Increment {
                id,
                delta,
                at_least,
            } => {
                let row = touched(tables, &mut products, id)?;
                let next = checked_increment(id, row.current_qty(), delta, at_least)?;
                *row = row.clone().with_current_qty(next);
            }
            StagedWrite::InsertSale(sale) => {
                if tables.sales.contains_key(&sale.id) || !sale_ids.insert(sale.id) {
                    return Err(StoreError::duplicate("sale", sale.id));
                }
                if !tables.products.contains_key(&sale.product_id)
                    && !products.contains_key(&sale.product_id)
                {
                    return Err(StoreError::not_found("product", sale.product_id));
                }
                sales.push(sale);
            }
            StagedWrite::InsertSupply(supply) => {
                if tables.supplies.contains_key(&supply.id) || !supply_ids.insert(supply.id) {
                    return Err(StoreError::duplicate("supply", supply.id));
                }
                supplies.push(supply);
            }
            StagedWrite::InsertSupplyItem(item) => {
                if tables.supply_items.contains_key(&item.id) || !item_ids.insert(item.id) {
                    return Err(StoreError::duplicate("supply item", item.id));
                }
                if !tables.supplies.contains_key(&item.supply_id)
                    && !supply_ids.contains(&item.supply_id)
                {
                    return Err(StoreError::not_found("supply", item.supply_id));
                }
                if !tables.products.contains_key(&item.product_id)
                    && !products.contains_key(&item.product_id)
                {
                    return Err(StoreError::not_found("product", item.product_id));
                }
                items.push(item);
            }
        }
    }

    tables.products.extend(products);
    tables.sales.extend(sales.into_iter().map(|s| (s.id(), s)));
    tables.supplies.extend(supplies.into_iter().map(|s| (s.id(), s)));
    tables.supply_items.extend(items.into_iter().map(|i| (i.id(), i)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use storeops_core::{Money, UserId};
    use storeops_products::ProductDetails;

    fn product(qty: i64) -> Product {
        let details = ProductDetails {
            name: "Milk".to_string(),
            department_id: None,
            supplier_id: None,
            price: Money::new(dec!(1.20)).unwrap(),
            min_threshold: 2,
            grade: None,
            expiry_date: None,
            storage_condition: None,
        };
        Product::restore(ProductId::new(), details, qty)
    }

    async fn seeded(qty: i64) -> (InMemoryStore, ProductId) {
        let store = InMemoryStore::new();
        let p = product(qty);
        let id = p.id_typed();
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.commit().await.unwrap();
        (store, id)
    }

    fn sale_of(product_id: ProductId, quantity: i64) -> Sale {
        Sale {
            id: SaleId::new(),
            product_id,
            quantity,
            total_price: Money::ZERO,
            sale_date: Utc::now(),
            cashier_id: UserId::new(),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_to_readers() {
        let (store, id) = seeded(10).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.increment_stock(id, -4, 0).await.unwrap(), 6);
        assert_eq!(tx.get_product(id).await.unwrap().unwrap().current_qty(), 6);
        assert_eq!(store.get_product(id).await.unwrap().unwrap().current_qty(), 10);

        tx.commit().await.unwrap();
        assert_eq!(store.get_product(id).await.unwrap().unwrap().current_qty(), 6);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let (store, id) = seeded(10).await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.increment_stock(id, -4, 0).await.unwrap();
        }
        assert_eq!(store.get_product(id).await.unwrap().unwrap().current_qty(), 10);
    }

    #[tokio::test]
    async fn predicate_rejection_leaves_value_unchanged() {
        let (store, id) = seeded(3).await;
        let mut tx = store.begin().await.unwrap();

        let err = tx.increment_stock(id, -4, 0).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::PredicateViolated {
                product_id: id,
                current: 3,
                delta: -4
            }
        );
        assert_eq!(tx.get_product(id).await.unwrap().unwrap().current_qty(), 3);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx.increment_stock(ProductId::new(), 1, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "product", .. }));
    }

    #[tokio::test]
    async fn racing_decrements_fail_at_commit() {
        let (store, id) = seeded(5).await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.increment_stock(id, -3, 0).await.unwrap();
        second.increment_stock(id, -3, 0).await.unwrap();
        second.insert_sale(&sale_of(id, 3)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::PredicateViolated { current: 2, .. }));

        assert_eq!(store.get_product(id).await.unwrap().unwrap().current_qty(), 2);
        assert!(store.sales_between(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn view_over_a_concurrent_increment_saturates_and_commit_fails() {
        let (store, id) = seeded(0).await;

        let mut big = store.begin().await.unwrap();
        assert_eq!(big.increment_stock(id, i64::MAX - 1, 0).await.unwrap(), i64::MAX - 1);

        let mut small = store.begin().await.unwrap();
        small.increment_stock(id, 5, 0).await.unwrap();
        small.commit().await.unwrap();

        assert_eq!(big.get_product(id).await.unwrap().unwrap().current_qty(), i64::MAX);
        let err = big.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("overflow")));
        assert_eq!(store.get_product(id).await.unwrap().unwrap().current_qty(), 5);
    }

    #[tokio::test]
    async fn commit_blocked_past_lock_timeout_times_out_without_applying() {
        let (store, id) = seeded(5).await;
        let store = store.with_lock_timeout(Duration::from_millis(20));

        let mut tx = store.begin().await.unwrap();
        tx.increment_stock(id, 3, 0).await.unwrap();

        let held = store.tables.write().await;
        let err = tx.commit().await.unwrap_err();
        drop(held);

        assert!(matches!(err, StoreError::Timeout(_)));
        assert_eq!(store.get_product(id).await.unwrap().unwrap().current_qty(), 5);
    }

    #[tokio::test]
    async fn duplicate_sale_is_rejected() {
        let (store, id) = seeded(5).await;
        let sale = sale_of(id, 1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_sale(&sale).await.unwrap();
        let err = tx.insert_sale(&sale).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "sale", .. }));
    }

    #[tokio::test]
    async fn finished_transaction_rejects_further_use() {
        let (store, id) = seeded(5).await;
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(tx.increment_stock(id, 1, 0).await, Err(StoreError::Backend(_))));
        assert!(matches!(tx.commit().await, Err(StoreError::Backend(_))));
        assert!(matches!(tx.rollback().await, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn details_update_keeps_committed_quantity() {
        let (store, id) = seeded(7).await;
        let current = store.get_product(id).await.unwrap().unwrap();
        let mut details = current.details().clone();
        details.name = "Oat milk".to_string();
        let stale = Product::restore(id, details, 0);

        let mut tx = store.begin().await.unwrap();
        tx.update_product_details(&stale).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_product(id).await.unwrap().unwrap();
        assert_eq!(stored.name(), "Oat milk");
        assert_eq!(stored.current_qty(), 7);
    }
}

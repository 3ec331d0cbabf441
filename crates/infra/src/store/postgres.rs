//! Postgres-backed store implementation.
//!
//! Every engine command runs inside one database transaction. The stock ledger's
//! guarded increment is a single conditional `UPDATE ... RETURNING`, so the row
//! lock taken by Postgres serializes concurrent adjustments of the same product
//! and the non-negativity predicate is evaluated against the latest committed
//! value.
//!
//! ## Schema
//!
//! The store expects these tables (migrations are managed outside this crate):
//!
//! ```sql
//! CREATE TABLE products (
//!     id                UUID PRIMARY KEY,
//!     name              TEXT NOT NULL,
//!     department_id     UUID NULL,
//!     supplier_id       UUID NULL,
//!     price             NUMERIC(12, 2) NOT NULL,
//!     current_qty       BIGINT NOT NULL CHECK (current_qty >= 0),
//!     min_threshold     BIGINT NOT NULL,
//!     grade             VARCHAR(1) NULL,
//!     expiry_date       DATE NULL,
//!     storage_condition VARCHAR(20) NULL
//! );
//! CREATE TABLE sales (
//!     id          UUID PRIMARY KEY,
//!     product_id  UUID NOT NULL REFERENCES products (id),
//!     quantity    BIGINT NOT NULL CHECK (quantity > 0),
//!     total_price NUMERIC(12, 2) NOT NULL,
//!     sale_date   TIMESTAMPTZ NOT NULL,
//!     cashier_id  UUID NOT NULL
//! );
//! CREATE TABLE supplies (
//!     id          UUID PRIMARY KEY,
//!     supplier_id UUID NOT NULL,
//!     supply_date TIMESTAMPTZ NOT NULL,
//!     total_cost  NUMERIC(12, 2) NOT NULL,
//!     approved_by UUID NOT NULL
//! );
//! CREATE TABLE supply_items (
//!     id         UUID PRIMARY KEY,
//!     supply_id  UUID NOT NULL REFERENCES supplies (id),
//!     line_no    INTEGER NOT NULL,
//!     product_id UUID NOT NULL REFERENCES products (id),
//!     quantity   BIGINT NOT NULL CHECK (quantity > 0),
//!     unit_price NUMERIC(12, 2) NOT NULL
//! );
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (query canceled, lock timeout) | `57014` / `55P03` | `Timeout` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut | N/A | `Timeout` |
//! | PoolClosed / Io | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use storeops_core::{
    DepartmentId, Money, ProductId, SaleId, SupplierId, SupplyId, SupplyItemId, UserId,
};
use storeops_products::{Product, ProductDetails};
use storeops_purchasing::{Supply, SupplyItem};
use storeops_sales::Sale;

use super::{Store, StoreError, StoreTx, finished_error};

const PRODUCT_COLUMNS: &str = "id, name, department_id, supplier_id, price, current_qty, \
     min_threshold, grade, expiry_date, storage_condition";

/// Postgres-backed transactional store.
///
/// Uses an SQLx connection pool, which is thread-safe; the store itself is a
/// cheap `Clone`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
    statement_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            statement_timeout,
        }
    }

    /// Build a pool for `database_url` without connecting eagerly.
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        statement_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(statement_timeout)
            .connect_lazy(database_url)
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, statement_timeout))
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // SET LOCAL does not accept bind parameters.
        let millis = self.statement_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL statement_timeout = {millis}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(Box::new(PostgresTx { tx: Some(tx) }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, quantity, total_price, sale_date, cashier_id
            FROM sales
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_sale", e))?;

        row.as_ref().map(sale_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn sales_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, total_price, sale_date, cashier_id
            FROM sales
            WHERE sale_date >= $1 AND sale_date < $2
            ORDER BY sale_date ASC, id ASC
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("sales_between", e))?;

        rows.iter().map(sale_from_row).collect()
    }

    async fn get_supply(&self, id: SupplyId) -> Result<Option<Supply>, StoreError> {
        let header = sqlx::query(
            r#"
            SELECT id, supplier_id, supply_date, total_cost, approved_by
            FROM supplies
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_supply", e))?;

        let Some(header) = header else {
            return Ok(None);
        };
        let mut supply = supply_from_row(&header)?;

        let items = sqlx::query(
            r#"
            SELECT id, supply_id, line_no, product_id, quantity, unit_price
            FROM supply_items
            WHERE supply_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_supply", e))?;

        supply.items = items
            .iter()
            .map(supply_item_from_row)
            .collect::<Result<_, _>>()?;
        Ok(Some(supply))
    }
}

/// Transaction handle for [`PostgresStore`].
///
/// Dropping an unfinished `sqlx::Transaction` rolls it back.
struct PostgresTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTx {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or_else(finished_error)
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, department_id, supplier_id, price, current_qty,
                min_threshold, grade, expiry_date, storage_condition
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(*product.id_typed().as_uuid())
        .bind(product.name())
        .bind(product.department_id().map(Uuid::from))
        .bind(product.supplier_id().map(Uuid::from))
        .bind(product.price().amount())
        .bind(product.current_qty())
        .bind(product.min_threshold())
        .bind(product.grade())
        .bind(product.expiry_date())
        .bind(product.storage_condition())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product_details(&mut self, product: &Product) -> Result<(), StoreError> {
        let id = product.id_typed();
        let tx = self.conn()?;
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2,
                department_id = $3,
                supplier_id = $4,
                price = $5,
                min_threshold = $6,
                grade = $7,
                expiry_date = $8,
                storage_condition = $9
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .bind(product.name())
        .bind(product.department_id().map(Uuid::from))
        .bind(product.supplier_id().map(Uuid::from))
        .bind(product.price().amount())
        .bind(product.min_threshold())
        .bind(product.grade())
        .bind(product.expiry_date())
        .bind(product.storage_condition())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_product_details", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", id));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn increment_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        at_least: i64,
    ) -> Result<i64, StoreError> {
        let tx = self.conn()?;
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET current_qty = current_qty + $2
            WHERE id = $1 AND current_qty + $2 >= $3
            RETURNING current_qty
            "#,
        )
        .bind(*id.as_uuid())
        .bind(delta)
        .bind(at_least)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("increment_stock", e))?;

        if let Some(next) = updated {
            return Ok(next);
        }

        // No row matched: either the product is missing or the predicate failed.
        let current: Option<i64> =
            sqlx::query_scalar("SELECT current_qty FROM products WHERE id = $1")
                .bind(*id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("increment_stock", e))?;

        match current {
            Some(current) => Err(StoreError::PredicateViolated {
                product_id: id,
                current,
                delta,
            }),
            None => Err(StoreError::not_found("product", id)),
        }
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO sales (id, product_id, quantity, total_price, sale_date, cashier_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*sale.id.as_uuid())
        .bind(*sale.product_id.as_uuid())
        .bind(sale.quantity)
        .bind(sale.total_price.amount())
        .bind(sale.sale_date)
        .bind(*sale.cashier_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_sale", e))?;
        Ok(())
    }

    async fn insert_supply(&mut self, supply: &Supply) -> Result<(), StoreError> {
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO supplies (id, supplier_id, supply_date, total_cost, approved_by)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*supply.id.as_uuid())
        .bind(*supply.supplier_id.as_uuid())
        .bind(supply.supply_date)
        .bind(supply.total_cost.amount())
        .bind(*supply.approved_by.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_supply", e))?;
        Ok(())
    }

    async fn insert_supply_item(&mut self, item: &SupplyItem) -> Result<(), StoreError> {
        let tx = self.conn()?;
        let line_no = i32::try_from(item.line_no)
            .map_err(|_| StoreError::Backend(format!("line number {} out of range", item.line_no)))?;
        sqlx::query(
            r#"
            INSERT INTO supply_items (id, supply_id, line_no, product_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*item.id.as_uuid())
        .bind(*item.supply_id.as_uuid())
        .bind(line_no)
        .bind(*item.product_id.as_uuid())
        .bind(item.quantity)
        .bind(item.unit_price.amount())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_supply_item", e))?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or_else(finished_error)?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or_else(finished_error)?;
        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn money(value: Decimal) -> Result<Money, StoreError> {
    Money::new(value).map_err(|e| StoreError::Backend(format!("stored amount rejected: {e}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode product row: {e}"));

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let department_id: Option<Uuid> = row.try_get("department_id").map_err(decode)?;
    let supplier_id: Option<Uuid> = row.try_get("supplier_id").map_err(decode)?;
    let price: Decimal = row.try_get("price").map_err(decode)?;
    let expiry_date: Option<NaiveDate> = row.try_get("expiry_date").map_err(decode)?;

    let details = ProductDetails {
        name: row.try_get("name").map_err(decode)?,
        department_id: department_id.map(DepartmentId::from_uuid),
        supplier_id: supplier_id.map(SupplierId::from_uuid),
        price: money(price)?,
        min_threshold: row.try_get("min_threshold").map_err(decode)?,
        grade: row.try_get("grade").map_err(decode)?,
        expiry_date,
        storage_condition: row.try_get("storage_condition").map_err(decode)?,
    };
    let current_qty: i64 = row.try_get("current_qty").map_err(decode)?;

    Ok(Product::restore(ProductId::from_uuid(id), details, current_qty))
}

fn sale_from_row(row: &PgRow) -> Result<Sale, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode sale row: {e}"));

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let product_id: Uuid = row.try_get("product_id").map_err(decode)?;
    let total_price: Decimal = row.try_get("total_price").map_err(decode)?;
    let cashier_id: Uuid = row.try_get("cashier_id").map_err(decode)?;

    Ok(Sale {
        id: SaleId::from_uuid(id),
        product_id: ProductId::from_uuid(product_id),
        quantity: row.try_get("quantity").map_err(decode)?,
        total_price: money(total_price)?,
        sale_date: row.try_get("sale_date").map_err(decode)?,
        cashier_id: UserId::from_uuid(cashier_id),
    })
}

fn supply_from_row(row: &PgRow) -> Result<Supply, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode supply row: {e}"));

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let supplier_id: Uuid = row.try_get("supplier_id").map_err(decode)?;
    let total_cost: Decimal = row.try_get("total_cost").map_err(decode)?;
    let approved_by: Uuid = row.try_get("approved_by").map_err(decode)?;

    Ok(Supply {
        id: SupplyId::from_uuid(id),
        supplier_id: SupplierId::from_uuid(supplier_id),
        supply_date: row.try_get("supply_date").map_err(decode)?,
        total_cost: money(total_cost)?,
        approved_by: UserId::from_uuid(approved_by),
        items: Vec::new(),
    })
}

fn supply_item_from_row(row: &PgRow) -> Result<SupplyItem, StoreError> {
    let decode =
        |e: sqlx::Error| StoreError::Backend(format!("failed to decode supply item row: {e}"));

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let supply_id: Uuid = row.try_get("supply_id").map_err(decode)?;
    let line_no: i32 = row.try_get("line_no").map_err(decode)?;
    let product_id: Uuid = row.try_get("product_id").map_err(decode)?;
    let unit_price: Decimal = row.try_get("unit_price").map_err(decode)?;

    Ok(SupplyItem {
        id: SupplyItemId::from_uuid(id),
        supply_id: SupplyId::from_uuid(supply_id),
        line_no: u32::try_from(line_no)
            .map_err(|_| StoreError::Backend(format!("negative line number {line_no}")))?,
        product_id: ProductId::from_uuid(product_id),
        quantity: row.try_get("quantity").map_err(decode)?,
        unit_price: money(unit_price)?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Duplicate {
                    entity: "row",
                    id: db_err.constraint().unwrap_or(operation).to_string(),
                },
                // Foreign key violation: a referenced row does not exist
                Some("23503") => StoreError::NotFound {
                    entity: "referenced row",
                    id: db_err.constraint().unwrap_or(operation).to_string(),
                },
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("57014") | Some("55P03") => StoreError::Timeout(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {}: {}", operation, e)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

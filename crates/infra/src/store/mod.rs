//! Transactional persistence boundary.
//!
//! The engine never talks to a database directly; it goes through [`Store`]
//! (reads and transaction begin) and [`StoreTx`] (row writes and the atomic
//! stock increment inside one transaction scope).
//!
//! ## Contract
//!
//! - `StoreTx::increment_stock` is a single atomic read-modify-write on the
//!   stored quantity: `qty := qty + delta` only if `qty + delta >= at_least`.
//!   Two concurrent increments on the same product never lose one another.
//! - Nothing written through a `StoreTx` is visible to readers before `commit`
//!   succeeds, and everything becomes visible at once.
//! - Dropping a `StoreTx` without committing rolls it back.
//! - Inserts never silently ignore conflicts: an existing identity is reported
//!   as [`StoreError::Duplicate`].

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use storeops_core::{ProductId, SaleId, SupplyId};
use storeops_products::Product;
use storeops_purchasing::{Supply, SupplyItem};
use storeops_sales::Sale;

/// Persistence collaborator error.
///
/// These are **infrastructure errors** as opposed to domain errors (validation,
/// invariants). The engine maps them onto its public taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The increment predicate rejected the delta; the stored value is unchanged.
    #[error("stock predicate violated for product {product_id}: current {current}, delta {delta}")]
    PredicateViolated {
        product_id: ProductId,
        current: i64,
        delta: i64,
    },

    #[error("duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: String },

    /// Serialization failure, deadlock or similar; safe to retry.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("store timeout: {0}")]
    Timeout(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn duplicate(entity: &'static str, id: impl ToString) -> Self {
        Self::Duplicate {
            entity,
            id: id.to_string(),
        }
    }
}

/// Read access plus transaction begin.
///
/// Reads outside a transaction see only committed state; they take no locks
/// that could block writers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a new transaction scope.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// All products, ordered by identity.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError>;

    /// Sales with `from <= sale_date < until`, ordered by sale date then identity.
    async fn sales_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError>;

    /// Supply header with its items attached in line order.
    async fn get_supply(&self, id: SupplyId) -> Result<Option<Supply>, StoreError>;
}

/// One transaction scope.
///
/// After `commit` or `rollback` the scope is finished and every further call
/// fails with [`StoreError::Backend`].
#[async_trait]
pub trait StoreTx: Send {
    /// Read a product as seen from inside this transaction (own writes included).
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;

    /// Update catalog attributes. The stored quantity is never written here.
    async fn update_product_details(&mut self, product: &Product) -> Result<(), StoreError>;

    /// Atomically add `delta` to the product's quantity if the result is `>= at_least`.
    ///
    /// Returns the new quantity. Fails with [`StoreError::NotFound`] for an unknown
    /// product and [`StoreError::PredicateViolated`] if the predicate rejects the
    /// result (stored value unchanged).
    async fn increment_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        at_least: i64,
    ) -> Result<i64, StoreError>;

    async fn insert_sale(&mut self, sale: &Sale) -> Result<(), StoreError>;

    /// Insert the supply header only; items go through `insert_supply_item`.
    async fn insert_supply(&mut self, supply: &Supply) -> Result<(), StoreError>;

    async fn insert_supply_item(&mut self, item: &SupplyItem) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

pub(crate) fn finished_error() -> StoreError {
    StoreError::Backend("transaction already finished".to_string())
}

//! Engine facade: the in-process interface offered to the API layer.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, instrument};

use storeops_core::{ProductId, SaleId, SupplyId};
use storeops_products::{NewProduct, Product, ProductDetails};
use storeops_purchasing::{CreateSupply, Supply};
use storeops_sales::{CreateSale, Sale};

use crate::analytics::{AnalyticsAggregator, SalesSummary};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, StoreBackend};
use crate::error::EngineError;
use crate::ledger::StockLedger;
use crate::scope::TransactionScope;
use crate::store::{InMemoryStore, PostgresStore, Store};
use crate::transactions::{SaleTransaction, SupplyTransaction};

/// Inventory stock consistency engine.
///
/// Cheap to clone; clones share the same store handle.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    sales: SaleTransaction,
    supplies: SupplyTransaction,
    analytics: AnalyticsAggregator,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Engine whose sales and supplies are dated by `clock`.
    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let ledger = StockLedger::new();
        Self {
            store,
            sales: SaleTransaction::new(ledger, Arc::clone(&clock)),
            supplies: SupplyTransaction::new(ledger, clock),
            analytics: AnalyticsAggregator::new(),
        }
    }

    /// Wire the engine to the store selected by `config`.
    ///
    /// The Postgres pool connects lazily; the first operation surfaces an
    /// unreachable database as a persistence error.
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match &config.backend {
            StoreBackend::InMemory => {
                info!("using in-memory store");
                Arc::new(InMemoryStore::new().with_lock_timeout(config.statement_timeout))
            }
            StoreBackend::Postgres {
                database_url,
                max_connections,
            } => {
                info!(max_connections, "using postgres store");
                let store = PostgresStore::connect_lazy(
                    database_url,
                    *max_connections,
                    config.statement_timeout,
                )
                .context("failed to configure postgres connection pool")?;
                Arc::new(store)
            }
        };
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Record a sale and decrement its product's stock atomically.
    pub async fn create_sale(&self, cmd: CreateSale) -> Result<Sale, EngineError> {
        self.sales.execute(self.store.as_ref(), &cmd).await
    }

    /// Record a supply with all its items and increment stock for each item atomically.
    pub async fn create_supply(&self, cmd: CreateSupply) -> Result<Supply, EngineError> {
        self.supplies.execute(self.store.as_ref(), &cmd).await
    }

    pub async fn low_stock_products(&self) -> Result<Vec<Product>, EngineError> {
        self.analytics.low_stock(self.store.as_ref()).await
    }

    /// Sales summary for the inclusive calendar-date range `start..=end` (`YYYY-MM-DD`).
    pub async fn sales_summary(&self, start: &str, end: &str) -> Result<SalesSummary, EngineError> {
        self.analytics
            .sales_summary(self.store.as_ref(), start, end)
            .await
    }

    /// Add a product to the catalog with its opening stock.
    #[instrument(skip(self, new_product), fields(name = %new_product.details.name))]
    pub async fn register_product(&self, new_product: NewProduct) -> Result<Product, EngineError> {
        let product = new_product.into_product(ProductId::new())?;

        let mut scope = TransactionScope::begin(self.store.as_ref()).await?;
        let outcome = scope.tx().insert_product(&product).await.map_err(EngineError::from);
        scope.finish(outcome).await?;

        info!(product_id = %product.id_typed(), current_qty = product.current_qty(), "product registered");
        Ok(product)
    }

    /// Replace a product's catalog attributes. The stock level is left untouched.
    #[instrument(skip(self, details))]
    pub async fn update_product_details(
        &self,
        product_id: ProductId,
        details: ProductDetails,
    ) -> Result<Product, EngineError> {
        details.validate()?;

        let mut scope = TransactionScope::begin(self.store.as_ref()).await?;
        let outcome = async {
            let tx = scope.tx();
            let mut product = tx
                .get_product(product_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("product {product_id}")))?;
            product.apply_details(details)?;
            tx.update_product_details(&product).await?;
            Ok::<_, EngineError>(product)
        }
        .await;
        scope.finish(outcome).await
    }

    pub async fn get_product(&self, product_id: ProductId) -> Result<Product, EngineError> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("product {product_id}")))
    }

    pub async fn get_sale(&self, sale_id: SaleId) -> Result<Sale, EngineError> {
        self.store
            .get_sale(sale_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("sale {sale_id}")))
    }

    pub async fn get_supply(&self, supply_id: SupplyId) -> Result<Supply, EngineError> {
        self.store
            .get_supply(supply_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("supply {supply_id}")))
    }
}

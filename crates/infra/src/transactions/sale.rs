use std::sync::Arc;

use tracing::{info, instrument, warn};

use storeops_core::SaleId;
use storeops_inventory::StockDelta;
use storeops_sales::{CreateSale, Sale};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::ledger::StockLedger;
use crate::scope::TransactionScope;
use crate::store::{Store, StoreTx};

/// Records one sale together with its stock decrement.
#[derive(Debug, Clone)]
pub struct SaleTransaction {
    ledger: StockLedger,
    clock: Arc<dyn Clock>,
}

impl SaleTransaction {
    pub fn new(ledger: StockLedger, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Validate, decrement stock and insert the sale in one transaction scope.
    ///
    /// The unit price is read from the product inside the scope and the sale
    /// date is taken from the clock. A rejected
    /// decrement means no sale row is written; a failed insert rolls the
    /// decrement back.
    #[instrument(
        skip(self, store, cmd),
        fields(
            product_id = %cmd.product_id,
            quantity = cmd.quantity,
            cashier_id = %cmd.cashier.user_id(),
            role = cmd.cashier.role().as_str()
        )
    )]
    pub async fn execute(&self, store: &dyn Store, cmd: &CreateSale) -> Result<Sale, EngineError> {
        if let Err(e) = cmd.validate() {
            warn!(error = %e, "sale rejected");
            return Err(e.into());
        }

        let mut scope = TransactionScope::begin(store).await?;
        let outcome = self.record(scope.tx(), cmd).await;
        let sale = scope.finish(outcome).await.inspect_err(|e| {
            warn!(error = %e, "sale rejected");
        })?;

        info!(sale_id = %sale.id, total_price = %sale.total_price, "sale recorded");
        Ok(sale)
    }

    async fn record(&self, tx: &mut dyn StoreTx, cmd: &CreateSale) -> Result<Sale, EngineError> {
        let product = tx
            .get_product(cmd.product_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("product {}", cmd.product_id)))?;

        let delta = StockDelta::decrease(cmd.quantity)?;
        self.ledger.apply_delta(tx, cmd.product_id, delta).await?;

        let sale = cmd.price(SaleId::new(), product.price(), self.clock.now())?;
        tx.insert_sale(&sale).await?;
        Ok(sale)
    }
}

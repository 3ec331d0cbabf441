use std::sync::Arc;

use tracing::{info, instrument, warn};

use storeops_core::SupplyId;
use storeops_inventory::StockDelta;
use storeops_purchasing::{CreateSupply, Supply};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::ledger::StockLedger;
use crate::scope::TransactionScope;
use crate::store::{Store, StoreTx};

/// Records one supply header, its items and their stock increments.
#[derive(Debug, Clone)]
pub struct SupplyTransaction {
    ledger: StockLedger,
    clock: Arc<dyn Clock>,
}

impl SupplyTransaction {
    pub fn new(ledger: StockLedger, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Insert the header, then for each item in order insert it and increment
    /// its product's stock. Any failing item rolls back the whole supply.
    #[instrument(
        skip(self, store, cmd),
        fields(supplier_id = %cmd.header.supplier_id, items = cmd.items.len(), approver_id = %cmd.approver.user_id())
    )]
    pub async fn execute(
        &self,
        store: &dyn Store,
        cmd: &CreateSupply,
    ) -> Result<Supply, EngineError> {
        let supply = match cmd.plan(SupplyId::new(), self.clock.now()) {
            Ok(supply) => supply,
            Err(e) => {
                warn!(error = %e, "supply rejected");
                return Err(e.into());
            }
        };

        let mut scope = TransactionScope::begin(store).await?;
        let outcome = self.record(scope.tx(), &supply).await;
        scope.finish(outcome).await.inspect_err(|e| {
            warn!(error = %e, "supply rejected");
        })?;

        info!(supply_id = %supply.id, total_cost = %supply.total_cost, "supply recorded");
        Ok(supply)
    }

    async fn record(&self, tx: &mut dyn StoreTx, supply: &Supply) -> Result<(), EngineError> {
        tx.insert_supply(supply).await?;
        for item in &supply.items {
            tx.insert_supply_item(item).await?;
            let delta = StockDelta::increase(item.quantity)?;
            self.ledger.apply_delta(tx, item.product_id, delta).await?;
        }
        Ok(())
    }
}

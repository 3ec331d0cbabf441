//! Stock ledger: the only writer of on-hand quantities.

use tracing::{instrument, warn};

use storeops_core::ProductId;
use storeops_inventory::StockDelta;

use crate::error::EngineError;
use crate::store::{StoreError, StoreTx};

/// Applies stock deltas inside an open transaction scope.
///
/// The adjustment is delegated to the store's guarded increment, so the new
/// quantity is computed from the stored value rather than from anything the
/// caller read earlier.
#[derive(Debug, Default, Copy, Clone)]
pub struct StockLedger;

impl StockLedger {
    /// Stock never goes below this.
    pub const FLOOR: i64 = 0;

    pub fn new() -> Self {
        Self
    }

    /// Adjust the product's quantity by `delta` and return the new quantity.
    ///
    /// Fails with `NotFound` for an unknown product and `InsufficientStock` if
    /// the result would be negative; the stored quantity is unchanged on failure.
    #[instrument(skip(self, tx), fields(product_id = %product_id, delta = delta.get()))]
    pub async fn apply_delta(
        &self,
        tx: &mut dyn StoreTx,
        product_id: ProductId,
        delta: StockDelta,
    ) -> Result<i64, EngineError> {
        match tx.increment_stock(product_id, delta.get(), Self::FLOOR).await {
            Ok(new_qty) => Ok(new_qty),
            Err(err @ StoreError::PredicateViolated { .. }) => {
                warn!(error = %err, "stock adjustment rejected");
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

//! Atomic transaction scope.

use tracing::warn;

use crate::error::EngineError;
use crate::store::{Store, StoreTx};

/// Unit of work over one store transaction.
///
/// Obtain with [`TransactionScope::begin`], do the work through [`tx`](Self::tx),
/// then hand the outcome to [`finish`](Self::finish): `Ok` commits, `Err` rolls
/// back. A scope dropped without `finish` rolls back as well, since the
/// underlying store transaction does.
pub struct TransactionScope {
    tx: Box<dyn StoreTx>,
}

impl TransactionScope {
    pub async fn begin(store: &dyn Store) -> Result<Self, EngineError> {
        let tx = store.begin().await?;
        Ok(Self { tx })
    }

    pub fn tx(&mut self) -> &mut dyn StoreTx {
        self.tx.as_mut()
    }

    /// Commit on success, roll back on failure. A failed rollback is logged and
    /// the outcome's error is still returned unchanged.
    pub async fn finish<T>(mut self, outcome: Result<T, EngineError>) -> Result<T, EngineError> {
        match outcome {
            Ok(value) => {
                self.tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; transaction discarded on drop");
                }
                Err(err)
            }
        }
    }
}

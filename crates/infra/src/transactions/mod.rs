//! Write-side units of work that couple a record to its stock adjustments.
//!
//! Each transaction opens one [`TransactionScope`](crate::scope::TransactionScope),
//! performs its row writes and ledger deltas through it, and commits only if
//! every step succeeded.

pub mod sale;
pub mod supply;

pub use sale::SaleTransaction;
pub use supply::SupplyTransaction;

//! Inventory domain module (stock arithmetic).
//!
//! This crate contains the pure rules for on-hand quantities: signed deltas,
//! the non-negativity check and the low-stock predicate. Applying a delta to
//! stored stock is the job of the ledger in `storeops-infra`.

pub mod stock;

pub use stock::{StockDelta, apply_delta, is_low_stock};

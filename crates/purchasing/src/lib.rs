//! Purchasing domain module (supplies received from suppliers).
//!
//! This crate contains business rules for supplies, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod supply;

pub use supply::{CreateSupply, Supply, SupplyHeader, SupplyItem, SupplyLine};

//! Sales domain module (point-of-sale records).
//!
//! This crate contains business rules for recording a sale, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod sale;

pub use sale::{CreateSale, Sale};

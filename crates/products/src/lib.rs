//! Products domain module (catalog records).
//!
//! This crate contains business rules for catalog products, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). The on-hand quantity
//! is carried here but only ever changed by the stock ledger in `storeops-infra`.

pub mod product;

pub use product::{NewProduct, Product, ProductDetails};

//! `storeops-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, money, the authenticated principal and the domain error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod principal;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DepartmentId, ProductId, SaleId, SupplierId, SupplyId, SupplyItemId, UserId};
pub use money::Money;
pub use principal::{Principal, Role};
pub use value_object::ValueObject;

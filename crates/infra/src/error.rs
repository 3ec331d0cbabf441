//! Public error taxonomy of the engine.

use thiserror::Error;

use storeops_core::{DomainError, ProductId};

use crate::store::StoreError;

/// Category of a persistence failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PersistenceErrorKind {
    /// Serialization failure, deadlock or duplicate identity; the whole command
    /// may be retried (identities are generated afresh on each attempt).
    Conflict,
    Timeout,
    Unavailable,
    Backend,
}

/// Failure of the persistence collaborator.
///
/// The transaction scope has been rolled back when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persistence failure ({kind:?}): {message}")]
pub struct PersistenceError {
    pub kind: PersistenceErrorKind,
    pub message: String,
}

impl PersistenceError {
    /// Whether re-running the whole command may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            PersistenceErrorKind::Conflict
                | PersistenceErrorKind::Timeout
                | PersistenceErrorKind::Unavailable
        )
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any state was touched.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A decrement would drive stock below zero.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// Unparseable date or start after end.
    #[error("invalid date range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Persistence(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::NotFound(what) => EngineError::NotFound(what),
            DomainError::Conflict(msg) => EngineError::Persistence(PersistenceError {
                kind: PersistenceErrorKind::Conflict,
                message: msg,
            }),
            // Pure stock arithmetic has no product context; callers that know the
            // product map the store's predicate failure instead.
            DomainError::InsufficientStock {
                available,
                requested,
            } => EngineError::Validation(format!(
                "insufficient stock: available {available}, requested {requested}"
            )),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        let persistence = |kind, message| {
            EngineError::Persistence(PersistenceError { kind, message })
        };
        match value {
            StoreError::NotFound { entity, id } => EngineError::NotFound(format!("{entity} {id}")),
            StoreError::PredicateViolated {
                product_id,
                current,
                delta,
            } => EngineError::InsufficientStock {
                product_id,
                available: current,
                requested: delta.saturating_neg(),
            },
            // Duplicates are rejected, never merged.
            StoreError::Duplicate { entity, id } => {
                persistence(PersistenceErrorKind::Conflict, format!("duplicate {entity}: {id}"))
            }
            StoreError::Conflict(msg) => persistence(PersistenceErrorKind::Conflict, msg),
            StoreError::Timeout(msg) => persistence(PersistenceErrorKind::Timeout, msg),
            StoreError::Unavailable(msg) => persistence(PersistenceErrorKind::Unavailable, msg),
            StoreError::Backend(msg) => persistence(PersistenceErrorKind::Backend, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storeops_core::SaleId;

    #[test]
    fn predicate_violation_becomes_insufficient_stock() {
        let product_id = ProductId::new();
        let err: EngineError = StoreError::PredicateViolated {
            product_id,
            current: 2,
            delta: -5,
        }
        .into();
        assert_eq!(
            err,
            EngineError::InsufficientStock {
                product_id,
                available: 2,
                requested: 5
            }
        );
    }

    #[test]
    fn transient_store_failures_are_retryable() {
        let conflict: EngineError = StoreError::Conflict("serialization".into()).into();
        let timeout: EngineError = StoreError::Timeout("lock".into()).into();
        let backend: EngineError = StoreError::Backend("disk".into()).into();
        assert!(conflict.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!backend.is_retryable());
        assert!(!EngineError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn duplicates_surface_as_conflicts() {
        let err: EngineError = StoreError::duplicate("sale", SaleId::new()).into();
        assert!(matches!(
            err,
            EngineError::Persistence(PersistenceError {
                kind: PersistenceErrorKind::Conflict,
                ..
            })
        ));
    }

    #[test]
    fn domain_validation_maps_to_validation() {
        let err: EngineError = DomainError::validation("quantity must be positive").into();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("positive")));
    }
}

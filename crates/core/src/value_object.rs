//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two amounts of
/// money with the same value are the same amount. To "modify" one, build a new one.
///
/// ```ignore
/// let a = Money::new(dec!(10.00))?;
/// let b = Money::new(dec!(10))?;
/// assert_eq!(a, b); // equal by value
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

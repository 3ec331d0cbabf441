//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Identifiers are totally ordered so stores can keep rows in a deterministic
/// order (listing by identity).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}

//! Value object marker.

/// Marker for types whose identity *is* their value.
///
/// A value object carries no id: two instances with equal fields are the
/// same thing, and "changing" one means constructing a replacement. [`Money`]
/// is the canonical example here; an expense, which keeps its identity across
/// edits, is not one.
///
/// [`Money`]: crate::money::Money
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

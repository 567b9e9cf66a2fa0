//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two instances with the same attributes
/// are interchangeable. `Money`, `Percentage` and billing periods are value
/// objects; invoices, statements and contracts are not.
///
/// They are immutable. "Changing" a value object means building a new one,
/// which is why every `Money` operation returns a fresh value instead of
/// mutating in place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

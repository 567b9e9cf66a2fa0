use chrono::{DateTime, Utc};

/// A fact published by a domain model or service.
///
/// Implementors are immutable values carrying a stable dotted type name
/// (e.g. "invoicing.invoice.activated") and a schema version, so subscribers
/// can route and evolve without inspecting the payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

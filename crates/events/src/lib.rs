//! Event mechanics shared by the billing crates.
//!
//! Domain crates describe *what happened* through [`Event`]; the infra crate
//! wraps events in an [`EventEnvelope`] and fans them out through an
//! [`EventBus`] to collaborators (notifications, audit).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

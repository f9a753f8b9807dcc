//! `pharmaflow-events` — event-sourcing mechanics (no business rules).
//!
//! Contains the event/projection abstractions shared by the domain
//! crates and the infrastructure layer. Transport and storage live elsewhere.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};

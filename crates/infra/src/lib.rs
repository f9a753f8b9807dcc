//! `pharmaflow-infra` — infrastructure composition.
//!
//! Event store, command dispatch pipeline, sequence counters, application
//! services orchestrating multi-aggregate operations, and read-model
//! projections. Domain crates stay pure; everything with state or IO-shaped
//! concerns lives here.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod sequence;
pub mod services;
pub mod streams;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, StreamAppend, UncommittedEvent,
};
pub use projections::ReadModels;
pub use sequence::{InMemorySequenceCounter, SequenceCounter, SequenceError};
pub use services::{
    CatalogService, FulfillmentService, InventoryService, NewProduct, OrderService,
    PurchaseService,
};

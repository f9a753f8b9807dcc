//! Infrastructure wiring: store, bus, sequence counter, read models.
//!
//! Commands go through the services in `pharmaflow-infra`; queries that need
//! cross-aggregate views go through the read models, which follow the bus on
//! a background thread. Point lookups go straight to the store for
//! read-your-writes consistency.

use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;

use pharmaflow_events::{EventBus, EventEnvelope, InMemoryEventBus};
use pharmaflow_infra::{
    CatalogService, CommandDispatcher, FulfillmentService, InMemoryEventStore,
    InMemorySequenceCounter, InventoryService, OrderService, PurchaseService, ReadModels,
};

pub type Store = Arc<InMemoryEventStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Counter = Arc<InMemorySequenceCounter>;

pub struct AppServices {
    store: Store,
    bus: Bus,
    counter: Counter,
    read_models: Arc<RwLock<ReadModels>>,
}

impl AppServices {
    fn dispatcher(&self) -> CommandDispatcher<Store, Bus> {
        CommandDispatcher::new(Arc::clone(&self.store), Arc::clone(&self.bus))
    }

    pub fn catalog(&self) -> CatalogService<Store, Bus> {
        CatalogService::new(self.dispatcher())
    }

    pub fn inventory(&self) -> InventoryService<Store, Bus> {
        InventoryService::new(self.dispatcher())
    }

    pub fn orders(&self) -> OrderService<Store, Bus, Counter> {
        OrderService::new(self.dispatcher(), Arc::clone(&self.counter))
    }

    pub fn fulfillment(&self) -> FulfillmentService<Store, Bus> {
        FulfillmentService::new(self.dispatcher())
    }

    pub fn purchasing(&self) -> PurchaseService<Store, Bus> {
        PurchaseService::new(self.dispatcher())
    }

    /// Read-model snapshot access. Eventually consistent with respect to
    /// just-committed events.
    pub fn read_models(&self) -> Arc<RwLock<ReadModels>> {
        Arc::clone(&self.read_models)
    }
}

pub fn build_services() -> AppServices {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let counter: Counter = Arc::new(InMemorySequenceCounter::new());

    let read_models = Arc::new(RwLock::new(ReadModels::new()));

    // Feed read models from the bus on a dedicated thread. Exits when the
    // bus is dropped.
    let subscription = bus.subscribe();
    let models = Arc::clone(&read_models);
    std::thread::spawn(move || {
        while let Ok(envelope) = subscription.recv() {
            match models.write() {
                Ok(mut models) => models.apply_envelope(&envelope),
                Err(_) => {
                    tracing::error!("read model lock poisoned; projection thread exiting");
                    break;
                }
            }
        }
    });

    AppServices {
        store,
        bus,
        counter,
        read_models,
    }
}

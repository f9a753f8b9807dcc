//! Read models built from published events.
//!
//! Read models are disposable: they can be dropped and rebuilt from
//! `EventStore::load_all` at any time. Live updates come from bus envelopes;
//! the bus delivers at-least-once, so duplicate or regressed sequence numbers
//! are detected by per-stream cursors and skipped.

mod invoices;
mod orders;
mod products;
mod purchases;
mod stock;

pub use invoices::InvoicesReadModel;
pub use orders::{OrderSummary, OrdersReadModel};
pub use products::ProductsReadModel;
pub use purchases::PurchasesReadModel;
pub use stock::StockReadModel;

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use pharmaflow_core::AggregateId;
use pharmaflow_events::{EventEnvelope, Projection, ProjectionRunner};

use crate::event_store::{EventStore, EventStoreError};

/// One projection instance per aggregate stream, with cursor tracking.
///
/// Envelopes for other aggregate types are ignored; malformed payloads and
/// duplicate deliveries are logged and skipped, never fatal.
pub struct StreamProjections<P, F>
where
    P: Projection,
    F: Fn(AggregateId) -> P,
{
    aggregate_type: &'static str,
    factory: F,
    runners: HashMap<AggregateId, ProjectionRunner<P>>,
}

impl<P, F> StreamProjections<P, F>
where
    P: Projection,
    P::Ev: DeserializeOwned,
    F: Fn(AggregateId) -> P,
{
    pub fn new(aggregate_type: &'static str, factory: F) -> Self {
        Self {
            aggregate_type,
            factory,
            runners: HashMap::new(),
        }
    }

    pub fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) {
        if envelope.aggregate_type() != self.aggregate_type {
            return;
        }

        let payload: P::Ev = match serde_json::from_value(envelope.payload().clone()) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(
                    aggregate_type = self.aggregate_type,
                    aggregate_id = %envelope.aggregate_id(),
                    sequence_number = envelope.sequence_number(),
                    %error,
                    "skipping undecodable event payload"
                );
                return;
            }
        };
        let typed = EventEnvelope::new(
            envelope.event_id(),
            envelope.aggregate_id(),
            envelope.aggregate_type(),
            envelope.sequence_number(),
            payload,
        );

        let runner = self
            .runners
            .entry(envelope.aggregate_id())
            .or_insert_with(|| ProjectionRunner::new((self.factory)(envelope.aggregate_id())));
        if runner.apply(&typed).is_err() {
            // At-least-once delivery; an already-seen sequence number is a
            // duplicate, not corruption.
            tracing::debug!(
                aggregate_type = self.aggregate_type,
                aggregate_id = %envelope.aggregate_id(),
                sequence_number = envelope.sequence_number(),
                "skipping duplicate event delivery"
            );
        }
    }

    pub fn get(&self, aggregate_id: AggregateId) -> Option<&P> {
        self.runners.get(&aggregate_id).map(|r| r.projection())
    }

    pub fn iter(&self) -> impl Iterator<Item = (AggregateId, &P)> {
        self.runners.iter().map(|(id, r)| (*id, r.projection()))
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}

/// All read models, updated together from one envelope feed.
pub struct ReadModels {
    pub products: ProductsReadModel,
    pub stock: StockReadModel,
    pub orders: OrdersReadModel,
    pub invoices: InvoicesReadModel,
    pub purchases: PurchasesReadModel,
}

impl ReadModels {
    pub fn new() -> Self {
        Self {
            products: ProductsReadModel::new(),
            stock: StockReadModel::new(),
            orders: OrdersReadModel::new(),
            invoices: InvoicesReadModel::new(),
            purchases: PurchasesReadModel::new(),
        }
    }

    pub fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) {
        self.products.apply_envelope(envelope);
        self.stock.apply_envelope(envelope);
        self.orders.apply_envelope(envelope);
        self.invoices.apply_envelope(envelope);
        self.purchases.apply_envelope(envelope);
    }

    /// Rebuild from the full event history.
    pub fn rebuild<S: EventStore>(store: &S) -> Result<Self, EventStoreError> {
        let mut models = Self::new();
        for stored in store.load_all()? {
            models.apply_envelope(&stored.to_envelope());
        }
        Ok(models)
    }
}

impl Default for ReadModels {
    fn default() -> Self {
        Self::new()
    }
}

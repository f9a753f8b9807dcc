//! Purchase read model.

use serde_json::Value as JsonValue;

use pharmaflow_core::{Aggregate, AggregateId};
use pharmaflow_events::{EventEnvelope, Projection};
use pharmaflow_purchasing::{Purchase, PurchaseEvent, PurchaseId, PurchaseStatus};

use crate::streams::PURCHASE_STREAM;

use super::StreamProjections;

pub struct PurchaseView {
    purchase: Purchase,
}

impl PurchaseView {
    fn new(aggregate_id: AggregateId) -> Self {
        Self {
            purchase: Purchase::empty(aggregate_id.into()),
        }
    }

    pub fn purchase(&self) -> &Purchase {
        &self.purchase
    }
}

impl Projection for PurchaseView {
    type Ev = PurchaseEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        self.purchase.apply(envelope.payload());
    }
}

pub struct PurchasesReadModel {
    views: StreamProjections<PurchaseView, fn(AggregateId) -> PurchaseView>,
}

impl PurchasesReadModel {
    pub fn new() -> Self {
        Self {
            views: StreamProjections::new(PURCHASE_STREAM, PurchaseView::new),
        }
    }

    pub fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) {
        self.views.apply_envelope(envelope);
    }

    pub fn get(&self, purchase_id: PurchaseId) -> Option<&Purchase> {
        self.views.get(purchase_id.into()).map(PurchaseView::purchase)
    }

    pub fn pending(&self) -> Vec<&Purchase> {
        self.views
            .iter()
            .map(|(_, v)| v.purchase())
            .filter(|p| p.status == PurchaseStatus::Pending)
            .collect()
    }

    pub fn list(&self) -> Vec<&Purchase> {
        self.views.iter().map(|(_, v)| v.purchase()).collect()
    }
}

impl Default for PurchasesReadModel {
    fn default() -> Self {
        Self::new()
    }
}

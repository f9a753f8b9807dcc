//! Invoice read model.

use serde_json::Value as JsonValue;

use pharmaflow_core::{Aggregate, AggregateId};
use pharmaflow_events::{EventEnvelope, Projection};
use pharmaflow_invoicing::{Invoice, InvoiceEvent, InvoiceId};
use pharmaflow_orders::OrderId;

use crate::streams::INVOICE_STREAM;

use super::StreamProjections;

pub struct InvoiceView {
    invoice: Invoice,
}

impl InvoiceView {
    fn new(aggregate_id: AggregateId) -> Self {
        Self {
            invoice: Invoice::empty(aggregate_id.into()),
        }
    }

    pub fn invoice(&self) -> &Invoice {
        &self.invoice
    }
}

impl Projection for InvoiceView {
    type Ev = InvoiceEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        self.invoice.apply(envelope.payload());
    }
}

pub struct InvoicesReadModel {
    views: StreamProjections<InvoiceView, fn(AggregateId) -> InvoiceView>,
}

impl InvoicesReadModel {
    pub fn new() -> Self {
        Self {
            views: StreamProjections::new(INVOICE_STREAM, InvoiceView::new),
        }
    }

    pub fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) {
        self.views.apply_envelope(envelope);
    }

    pub fn get(&self, invoice_id: InvoiceId) -> Option<&Invoice> {
        self.views.get(invoice_id.into()).map(InvoiceView::invoice)
    }

    pub fn for_order(&self, order_id: OrderId) -> Option<&Invoice> {
        self.views
            .iter()
            .map(|(_, v)| v.invoice())
            .find(|inv| inv.order_id == Some(order_id))
    }

    pub fn list(&self) -> Vec<&Invoice> {
        let mut invoices: Vec<&Invoice> = self.views.iter().map(|(_, v)| v.invoice()).collect();
        invoices.sort_by(|a, b| a.invoice_number.cmp(&b.invoice_number));
        invoices
    }
}

impl Default for InvoicesReadModel {
    fn default() -> Self {
        Self::new()
    }
}

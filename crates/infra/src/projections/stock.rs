//! Stock read model.
//!
//! On-hand stock is derived entirely from batch events; nothing stores a
//! standalone quantity that could drift from the movement history.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use pharmaflow_core::{Aggregate, AggregateId};
use pharmaflow_events::{EventEnvelope, Projection};
use pharmaflow_inventory::{AvailableBatch, ProductStock, StockEvent};
use pharmaflow_products::ProductId;

use crate::streams::{STOCK_STREAM, stock_stream_id};

use super::StreamProjections;

/// Per-stream stock view.
///
/// The stream id is derived from the product id, so the product id is only
/// known once the first event arrives.
pub struct StockView {
    stock: Option<ProductStock>,
}

impl StockView {
    fn new(_aggregate_id: AggregateId) -> Self {
        Self { stock: None }
    }

    pub fn stock(&self) -> Option<&ProductStock> {
        self.stock.as_ref()
    }
}

impl Projection for StockView {
    type Ev = StockEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        let event = envelope.payload();
        let product_id = match event {
            StockEvent::Received(e) => e.product_id,
            StockEvent::Debited(e) => e.product_id,
            StockEvent::WrittenOff(e) => e.product_id,
        };
        self.stock
            .get_or_insert_with(|| ProductStock::empty(product_id))
            .apply(event);
    }
}

pub struct StockReadModel {
    views: StreamProjections<StockView, fn(AggregateId) -> StockView>,
}

impl StockReadModel {
    pub fn new() -> Self {
        Self {
            views: StreamProjections::new(STOCK_STREAM, StockView::new),
        }
    }

    pub fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) {
        self.views.apply_envelope(envelope);
    }

    pub fn on_hand(&self, product_id: ProductId) -> u64 {
        self.views
            .get(stock_stream_id(product_id))
            .and_then(StockView::stock)
            .map(ProductStock::on_hand)
            .unwrap_or(0)
    }

    pub fn available_batches(&self, product_id: ProductId, today: NaiveDate) -> Vec<AvailableBatch> {
        self.views
            .get(stock_stream_id(product_id))
            .and_then(StockView::stock)
            .map(|s| s.available_batches(today))
            .unwrap_or_default()
    }
}

impl Default for StockReadModel {
    fn default() -> Self {
        Self::new()
    }
}

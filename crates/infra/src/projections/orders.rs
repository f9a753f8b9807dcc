//! Order read model.

use serde::Serialize;
use serde_json::Value as JsonValue;

use pharmaflow_core::{AggregateId, Aggregate, PharmacyId};
use pharmaflow_events::{EventEnvelope, Projection};
use pharmaflow_orders::{Order, OrderEvent, OrderId, OrderStatus, PaymentStatus};

use crate::streams::ORDER_STREAM;

use super::StreamProjections;

/// Per-stream order view: the rehydrated aggregate, summarized on query.
pub struct OrderView {
    order: Order,
}

impl OrderView {
    fn new(aggregate_id: AggregateId) -> Self {
        Self {
            order: Order::empty(aggregate_id.into()),
        }
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            order_id: self.order.id,
            order_number: self.order.order_number.clone(),
            pharmacy_id: self.order.pharmacy_id,
            status: self.order.status,
            payment_status: self.order.payment_status,
            total_amount: self.order.total_amount,
            dispatched_amount: self.order.dispatched_amount(),
            paid_amount: self.order.paid_amount,
            outstanding_amount: self.order.outstanding_amount(),
            is_void: self.order.is_void,
            line_count: self.order.lines.len(),
        }
    }
}

impl Projection for OrderView {
    type Ev = OrderEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        self.order.apply(envelope.payload());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub order_number: String,
    pub pharmacy_id: PharmacyId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: u64,
    pub dispatched_amount: u64,
    pub paid_amount: u64,
    pub outstanding_amount: u64,
    pub is_void: bool,
    pub line_count: usize,
}

pub struct OrdersReadModel {
    views: StreamProjections<OrderView, fn(AggregateId) -> OrderView>,
}

impl OrdersReadModel {
    pub fn new() -> Self {
        Self {
            views: StreamProjections::new(ORDER_STREAM, OrderView::new),
        }
    }

    pub fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) {
        self.views.apply_envelope(envelope);
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.views.get(order_id.into()).map(OrderView::order)
    }

    /// All orders, newest first by order number.
    pub fn list(&self) -> Vec<OrderSummary> {
        let mut summaries: Vec<OrderSummary> =
            self.views.iter().map(|(_, v)| v.summary()).collect();
        summaries.sort_by(|a, b| b.order_number.cmp(&a.order_number));
        summaries
    }

    pub fn list_for_pharmacy(&self, pharmacy_id: PharmacyId) -> Vec<OrderSummary> {
        self.list()
            .into_iter()
            .filter(|s| s.pharmacy_id == pharmacy_id)
            .collect()
    }

    /// Orders with a collectible balance.
    pub fn with_outstanding_balance(&self) -> Vec<OrderSummary> {
        self.list()
            .into_iter()
            .filter(|s| !s.is_void && s.outstanding_amount > 0)
            .collect()
    }
}

impl Default for OrdersReadModel {
    fn default() -> Self {
        Self::new()
    }
}

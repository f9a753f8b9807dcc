//! Product catalog read model.

use serde_json::Value as JsonValue;

use pharmaflow_core::{Aggregate, AggregateId};
use pharmaflow_events::{EventEnvelope, Projection};
use pharmaflow_products::{Product, ProductEvent, ProductId};

use crate::streams::PRODUCT_STREAM;

use super::StreamProjections;

pub struct ProductView {
    product: Product,
}

impl ProductView {
    fn new(aggregate_id: AggregateId) -> Self {
        Self {
            product: Product::empty(aggregate_id.into()),
        }
    }

    pub fn product(&self) -> &Product {
        &self.product
    }
}

impl Projection for ProductView {
    type Ev = ProductEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        self.product.apply(envelope.payload());
    }
}

pub struct ProductsReadModel {
    views: StreamProjections<ProductView, fn(AggregateId) -> ProductView>,
}

impl ProductsReadModel {
    pub fn new() -> Self {
        Self {
            views: StreamProjections::new(PRODUCT_STREAM, ProductView::new),
        }
    }

    pub fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) {
        self.views.apply_envelope(envelope);
    }

    pub fn get(&self, product_id: ProductId) -> Option<&Product> {
        self.views.get(product_id.into()).map(ProductView::product)
    }

    /// Active products sorted by name.
    pub fn active(&self) -> Vec<&Product> {
        let mut products: Vec<&Product> = self
            .views
            .iter()
            .map(|(_, v)| v.product())
            .filter(|p| p.is_active)
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        products
    }
}

impl Default for ProductsReadModel {
    fn default() -> Self {
        Self::new()
    }
}

//! Product catalog operations.

use chrono::Utc;
use serde_json::Value as JsonValue;

use pharmaflow_core::DomainError;
use pharmaflow_events::{EventBus, EventEnvelope};
use pharmaflow_products::{
    CreateProduct, DeactivateProduct, Product, ProductCommand, ProductId, ProductSnapshot,
    UpdatePricing,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, rehydrate};
use crate::event_store::EventStore;
use crate::streams::PRODUCT_STREAM;

use super::with_retry;

pub struct CatalogService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub mrp: u64,
    pub selling_price: u64,
    pub gst_rate_bps: u32,
    pub default_discount_bps: u32,
    pub pack_size: String,
    pub unit: String,
}

impl<S, B> CatalogService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>) -> Self {
        Self { dispatcher }
    }

    pub fn create_product(&self, input: NewProduct) -> Result<ProductId, DispatchError> {
        let product_id = ProductId::new();
        let command = ProductCommand::Create(CreateProduct {
            product_id,
            name: input.name,
            mrp: input.mrp,
            selling_price: input.selling_price,
            gst_rate_bps: input.gst_rate_bps,
            default_discount_bps: input.default_discount_bps,
            pack_size: input.pack_size,
            unit: input.unit,
            occurred_at: Utc::now(),
        });

        self.dispatcher.dispatch::<Product>(
            product_id.into(),
            PRODUCT_STREAM,
            command,
            |id| Product::empty(id.into()),
        )?;
        Ok(product_id)
    }

    pub fn update_pricing(
        &self,
        product_id: ProductId,
        mrp: u64,
        selling_price: u64,
        gst_rate_bps: u32,
        default_discount_bps: u32,
    ) -> Result<(), DispatchError> {
        with_retry("update_pricing", || {
            let command = ProductCommand::UpdatePricing(UpdatePricing {
                product_id,
                mrp,
                selling_price,
                gst_rate_bps,
                default_discount_bps,
                occurred_at: Utc::now(),
            });
            self.dispatcher
                .dispatch::<Product>(product_id.into(), PRODUCT_STREAM, command, |id| {
                    Product::empty(id.into())
                })
                .map(|_| ())
        })
    }

    pub fn deactivate_product(&self, product_id: ProductId) -> Result<(), DispatchError> {
        with_retry("deactivate_product", || {
            let command = ProductCommand::Deactivate(DeactivateProduct {
                product_id,
                occurred_at: Utc::now(),
            });
            self.dispatcher
                .dispatch::<Product>(product_id.into(), PRODUCT_STREAM, command, |id| {
                    Product::empty(id.into())
                })
                .map(|_| ())
        })
    }

    /// Pricing snapshot for order-line creation. Fails for unknown or
    /// inactive products.
    pub fn product_snapshot(&self, product_id: ProductId) -> Result<ProductSnapshot, DispatchError> {
        let (product, _) = rehydrate::<Product, _>(self.dispatcher.store(), product_id.into(), |id| {
            Product::empty(id.into())
        })?;
        product.snapshot().map_err(DispatchError::from)
    }

    pub fn load_product(&self, product_id: ProductId) -> Result<Product, DispatchError> {
        let (product, _) = rehydrate::<Product, _>(self.dispatcher.store(), product_id.into(), |id| {
            Product::empty(id.into())
        })?;
        if !product.created {
            return Err(DispatchError::from(DomainError::NotFound));
        }
        Ok(product)
    }
}

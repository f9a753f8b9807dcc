//! `pharmaflow-products` — product catalog aggregate.
//!
//! Products are read-mostly: orders snapshot their pricing at line creation
//! time, so later pricing changes never touch existing orders. On-hand stock
//! is **not** stored here; it is a projection over batch events owned by the
//! inventory crate.

pub mod product;

pub use product::{
    CreateProduct, DeactivateProduct, PricingUpdated, Product, ProductCommand, ProductCreated,
    ProductDeactivated, ProductEvent, ProductId, ProductSnapshot, UpdatePricing,
};

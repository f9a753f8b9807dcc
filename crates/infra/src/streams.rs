//! Stream naming and identity.
//!
//! Aggregate type labels are part of the stored record: the event store
//! enforces that a stream never changes type, and projections filter on them.
//! Services and projections must agree on these exact strings.

use uuid::Uuid;

use pharmaflow_core::AggregateId;
use pharmaflow_products::ProductId;

pub const PRODUCT_STREAM: &str = "products.product";
pub const STOCK_STREAM: &str = "inventory.product_stock";
pub const ORDER_STREAM: &str = "orders.order";
pub const INVOICE_STREAM: &str = "invoicing.invoice";
pub const PURCHASE_STREAM: &str = "purchasing.purchase";

/// Namespace for deriving stock stream ids from product ids.
const STOCK_STREAM_NAMESPACE: Uuid = Uuid::from_u128(0x7a1d_5c2e_9b4f_4c8a_8e61_03d2_f5b7_a940);

/// Stream id for a product's stock ledger.
///
/// Catalog and stock are separate aggregates keyed by the same product, so
/// the stock stream gets a deterministic id derived from the product id
/// instead of reusing it. Anyone holding the product id can compute the
/// stream id without a lookup.
pub fn stock_stream_id(product_id: ProductId) -> AggregateId {
    AggregateId::from_uuid(Uuid::new_v5(
        &STOCK_STREAM_NAMESPACE,
        product_id.as_uuid().as_bytes(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_stream_id_is_deterministic_and_distinct_from_product_id() {
        let product = ProductId::new();
        let a = stock_stream_id(product);
        let b = stock_stream_id(product);
        assert_eq!(a, b);
        assert_ne!(*a.as_uuid(), *product.as_uuid());
    }

    #[test]
    fn different_products_get_different_stock_streams() {
        assert_ne!(
            stock_stream_id(ProductId::new()),
            stock_stream_id(ProductId::new())
        );
    }
}

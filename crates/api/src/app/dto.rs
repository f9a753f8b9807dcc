//! Request DTOs and response JSON mapping.
//!
//! Requests carry raw uuids and plain fields; handlers convert them into
//! domain ids and commands. Responses are built with `json!` so the wire
//! shape is explicit and decoupled from aggregate internals.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use pharmaflow_inventory::AvailableBatch;
use pharmaflow_invoicing::Invoice;
use pharmaflow_orders::{Order, OrderStatus};
use pharmaflow_products::Product;
use pharmaflow_purchasing::Purchase;

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub mrp: u64,
    pub selling_price: u64,
    pub gst_rate_bps: u32,
    #[serde(default)]
    pub default_discount_bps: u32,
    pub pack_size: String,
    pub unit: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    pub mrp: u64,
    pub selling_price: u64,
    pub gst_rate_bps: u32,
    #[serde(default)]
    pub default_discount_bps: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveBatchRequest {
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub received_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct WriteOffRequest {
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub free_qty: u32,
    /// Absolute discount in minor units. When absent, the product's default
    /// discount rate is applied to the line subtotal.
    pub discount_amount: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Required for staff-created orders; ignored for pharmacy portal tokens,
    /// which are always bound to their own store.
    pub pharmacy_id: Option<Uuid>,
    pub lines: Vec<OrderLineRequest>,
    #[serde(default)]
    pub salesman_name: String,
    #[serde(default)]
    pub terms: String,
    #[serde(default)]
    pub delivery_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceLinesRequest {
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct AllocationRowRequest {
    pub line_no: u32,
    pub product_id: Uuid,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub rows: Vec<AllocationRowRequest>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseLineRequest {
    pub product_id: Uuid,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub unit_cost: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    pub supplier_name: String,
    pub lines: Vec<PurchaseLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ApprovePurchaseRequest {
    pub received_date: Option<NaiveDate>,
}

// ── Responses ───────────────────────────────────────────────────────────────

pub fn product_to_json(product: &Product) -> JsonValue {
    json!({
        "product_id": product.id,
        "name": product.name,
        "mrp": product.mrp,
        "selling_price": product.selling_price,
        "gst_rate_bps": product.gst_rate_bps,
        "default_discount_bps": product.default_discount_bps,
        "pack_size": product.pack_size,
        "unit": product.unit,
        "is_active": product.is_active,
    })
}

pub fn batch_to_json(batch: &AvailableBatch) -> JsonValue {
    json!({
        "batch_number": batch.batch_number,
        "expiry_date": batch.expiry_date,
        "quantity": batch.quantity,
        "received_date": batch.received_date,
    })
}

pub fn order_to_json(order: &Order) -> JsonValue {
    let lines: Vec<JsonValue> = order
        .lines
        .iter()
        .map(|line| {
            let allocations: Vec<JsonValue> = line
                .allocations
                .iter()
                .map(|alloc| {
                    json!({
                        "allocation_id": alloc.allocation_id,
                        "dispatch_id": alloc.dispatch_id,
                        "batch_number": alloc.batch_number,
                        "expiry_date": alloc.expiry_date,
                        "quantity": alloc.quantity,
                    })
                })
                .collect();
            json!({
                "line_no": line.line_no,
                "product_id": line.product_id,
                "product_name": line.product_name,
                "quantity": line.quantity,
                "free_qty": line.free_qty,
                "unit_price": line.unit_price,
                "gst_rate_bps": line.gst_rate_bps,
                "discount_amount": line.discount_amount,
                "total_price": line.total_price,
                "is_void": line.is_void,
                "dispatched_quantity": line.dispatched_quantity(),
                "remaining_quantity": line.remaining_quantity(),
                "allocations": allocations,
            })
        })
        .collect();

    json!({
        "order_id": order.id,
        "order_number": order.order_number,
        "pharmacy_id": order.pharmacy_id,
        "status": order.status,
        "payment_status": order.payment_status,
        "total_amount": order.total_amount,
        "dispatched_amount": order.dispatched_amount(),
        "paid_amount": order.paid_amount,
        "outstanding_amount": order.outstanding_amount(),
        "is_void": order.is_void,
        "salesman_name": order.salesman_name,
        "terms": order.terms,
        "delivery_type": order.delivery_type,
        "lines": lines,
    })
}

pub fn invoice_to_json(invoice: &Invoice) -> JsonValue {
    json!({
        "invoice_id": invoice.id,
        "invoice_number": invoice.invoice_number,
        "order_id": invoice.order_id,
    })
}

pub fn purchase_to_json(purchase: &Purchase) -> JsonValue {
    let lines: Vec<JsonValue> = purchase
        .lines
        .iter()
        .map(|line| {
            json!({
                "product_id": line.product_id,
                "batch_number": line.batch_number,
                "expiry_date": line.expiry_date,
                "quantity": line.quantity,
                "unit_cost": line.unit_cost,
            })
        })
        .collect();

    json!({
        "purchase_id": purchase.id,
        "supplier_name": purchase.supplier_name,
        "total_cost": purchase.total_cost,
        "status": purchase.status,
        "is_paid": purchase.is_paid,
        "lines": lines,
    })
}

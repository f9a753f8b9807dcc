//! End-to-end tests over the in-memory store, bus and services.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use pharmaflow_core::PharmacyId;
use pharmaflow_events::{EventBus, EventEnvelope, InMemoryEventBus};
use pharmaflow_orders::{AllocationRow, NewOrderLine, OrderId, OrderStatus, PaymentStatus};
use pharmaflow_products::ProductId;
use pharmaflow_purchasing::{PurchaseLine, PurchaseStatus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::InMemoryEventStore;
use crate::projections::ReadModels;
use crate::sequence::InMemorySequenceCounter;
use crate::services::{
    CatalogService, FulfillmentService, InventoryService, NewProduct, OrderService,
    PurchaseService,
};

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

struct App {
    store: Store,
    bus: Bus,
    counter: Arc<InMemorySequenceCounter>,
}

impl App {
    fn new() -> Self {
        Self {
            store: Arc::new(InMemoryEventStore::new()),
            bus: Arc::new(InMemoryEventBus::new()),
            counter: Arc::new(InMemorySequenceCounter::new()),
        }
    }

    fn dispatcher(&self) -> CommandDispatcher<Store, Bus> {
        CommandDispatcher::new(Arc::clone(&self.store), Arc::clone(&self.bus))
    }

    fn catalog(&self) -> CatalogService<Store, Bus> {
        CatalogService::new(self.dispatcher())
    }

    fn inventory(&self) -> InventoryService<Store, Bus> {
        InventoryService::new(self.dispatcher())
    }

    fn orders(&self) -> OrderService<Store, Bus, Arc<InMemorySequenceCounter>> {
        OrderService::new(self.dispatcher(), Arc::clone(&self.counter))
    }

    fn fulfillment(&self) -> FulfillmentService<Store, Bus> {
        FulfillmentService::new(self.dispatcher())
    }

    fn purchasing(&self) -> PurchaseService<Store, Bus> {
        PurchaseService::new(self.dispatcher())
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(2026, 8, 28)
}

/// Product priced at 100 minor units with `qty` on hand in batch `B1`.
fn seed_product(app: &App, qty: u32) -> ProductId {
    let product_id = app
        .catalog()
        .create_product(NewProduct {
            name: "Paracetamol 500mg".to_string(),
            mrp: 150,
            selling_price: 100,
            gst_rate_bps: 1_200,
            default_discount_bps: 0,
            pack_size: "10x10".to_string(),
            unit: "strip".to_string(),
        })
        .unwrap();
    if qty > 0 {
        app.inventory()
            .receive_batch(product_id, "B1".to_string(), date(2027, 6, 30), qty, today())
            .unwrap();
    }
    product_id
}

fn order_line(app: &App, product_id: ProductId, quantity: u32) -> NewOrderLine {
    let snapshot = app.catalog().product_snapshot(product_id).unwrap();
    NewOrderLine {
        product_id,
        product_name: snapshot.name,
        quantity,
        free_qty: 0,
        unit_price: snapshot.unit_price,
        gst_rate_bps: snapshot.gst_rate_bps,
        discount_amount: 0,
    }
}

fn seed_order(app: &App, product_id: ProductId, quantity: u32) -> OrderId {
    let (order_id, _) = app
        .orders()
        .create_order(
            PharmacyId::new(),
            vec![order_line(app, product_id, quantity)],
            "R. Gupta".to_string(),
            "net 30".to_string(),
            "courier".to_string(),
            today(),
        )
        .unwrap();
    order_id
}

fn row(product_id: ProductId, batch: &str, qty: u32) -> AllocationRow {
    AllocationRow {
        line_no: 1,
        product_id,
        batch_number: batch.to_string(),
        expiry_date: date(2027, 6, 30),
        quantity: qty,
    }
}

#[test]
fn order_numbers_are_sequential_per_day() {
    let app = App::new();
    let product_id = seed_product(&app, 100);

    let orders = app.orders();
    let numbers: Vec<String> = (0..3)
        .map(|_| {
            orders
                .create_order(
                    PharmacyId::new(),
                    vec![order_line(&app, product_id, 1)],
                    String::new(),
                    String::new(),
                    String::new(),
                    today(),
                )
                .unwrap()
                .1
        })
        .collect();

    assert_eq!(
        numbers,
        vec![
            "ORD-20260828-0001".to_string(),
            "ORD-20260828-0002".to_string(),
            "ORD-20260828-0003".to_string(),
        ]
    );
}

#[test]
fn two_partial_dispatches_debit_stock_and_cover_the_line() {
    let app = App::new();
    let product_id = seed_product(&app, 20);
    app.inventory()
        .receive_batch(product_id, "B2".to_string(), date(2027, 6, 30), 10, today())
        .unwrap();
    let order_id = seed_order(&app, product_id, 10);

    let fulfillment = app.fulfillment();
    let d1 = fulfillment
        .record_dispatch(order_id, vec![row(product_id, "B1", 6)])
        .unwrap();
    let d2 = fulfillment
        .record_dispatch(order_id, vec![row(product_id, "B2", 4)])
        .unwrap();
    assert_ne!(d1, d2);

    let order = app.orders().load_order(order_id).unwrap();
    assert_eq!(order.lines[0].dispatched_quantity(), 10);
    assert_eq!(order.lines[0].remaining_quantity(), 0);
    assert_eq!(order.dispatched_amount(), 1_000);

    let inventory = app.inventory();
    assert_eq!(inventory.on_hand(product_id).unwrap(), 20);
    let batches = inventory.available_batches(product_id, today()).unwrap();
    let quantities: Vec<(String, u32)> = batches
        .iter()
        .map(|b| (b.batch_number.clone(), b.quantity))
        .collect();
    assert_eq!(
        quantities,
        vec![("B1".to_string(), 14), ("B2".to_string(), 6)]
    );
}

#[test]
fn payment_is_bounded_by_dispatched_value() {
    let app = App::new();
    let product_id = seed_product(&app, 20);
    let order_id = seed_order(&app, product_id, 10);
    app.fulfillment()
        .record_dispatch(order_id, vec![row(product_id, "B1", 10)])
        .unwrap();

    let orders = app.orders();
    let err = orders.record_payment(order_id, 1_100).unwrap_err();
    match err {
        DispatchError::Validation(msg) => {
            assert!(msg.contains("maximum collectible is 1000"))
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    orders.record_payment(order_id, 1_000).unwrap();
    let order = orders.load_order(order_id).unwrap();
    assert_eq!(order.paid_amount, 1_000);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.outstanding_amount(), 0);
}

#[test]
fn approve_issues_exactly_one_invoice() {
    let app = App::new();
    let product_id = seed_product(&app, 20);
    let order_id = seed_order(&app, product_id, 5);

    let orders = app.orders();
    let (invoice_id, invoice_number) = orders.approve_order(order_id, today()).unwrap();
    assert_eq!(invoice_number, "INV-2026-0001");

    let err = orders.approve_order(order_id, today()).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));

    let models = ReadModels::rebuild(&app.store).unwrap();
    let invoice = models.invoices.for_order(order_id).unwrap();
    assert_eq!(invoice.id, invoice_id);
    assert_eq!(models.invoices.list().len(), 1);

    let order = orders.load_order(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Approved);
}

#[test]
fn failed_dispatch_leaves_order_and_stock_untouched() {
    let app = App::new();
    let product_id = seed_product(&app, 5);
    let order_id = seed_order(&app, product_id, 10);

    // The order can take 8 more, but the batch only holds 5.
    let err = app
        .fulfillment()
        .record_dispatch(order_id, vec![row(product_id, "B1", 8)])
        .unwrap_err();
    match err {
        DispatchError::Validation(msg) => assert!(msg.contains("insufficient stock")),
        other => panic!("expected validation error, got {other:?}"),
    }

    let order = app.orders().load_order(order_id).unwrap();
    assert_eq!(order.lines[0].dispatched_quantity(), 0);
    assert_eq!(app.inventory().on_hand(product_id).unwrap(), 5);
}

#[test]
fn replace_lines_blocked_once_stock_is_committed() {
    let app = App::new();
    let product_id = seed_product(&app, 20);
    let order_id = seed_order(&app, product_id, 10);

    let orders = app.orders();
    orders
        .replace_lines(order_id, vec![order_line(&app, product_id, 4)])
        .unwrap();

    app.fulfillment()
        .allocate_single(order_id, row(product_id, "B1", 2))
        .unwrap();

    let err = orders
        .replace_lines(order_id, vec![order_line(&app, product_id, 6)])
        .unwrap_err();
    match err {
        DispatchError::Conflict(msg) => assert!(msg.contains("B1")),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn void_line_then_order_recomputes_totals() {
    let app = App::new();
    let product_id = seed_product(&app, 50);
    let (order_id, _) = app
        .orders()
        .create_order(
            PharmacyId::new(),
            vec![
                order_line(&app, product_id, 10), // 1000
                order_line(&app, product_id, 5),  // 500
                order_line(&app, product_id, 2),  // 200
            ],
            String::new(),
            String::new(),
            String::new(),
            today(),
        )
        .unwrap();

    let orders = app.orders();
    orders.void_line(order_id, 2).unwrap();
    let order = orders.load_order(order_id).unwrap();
    assert_eq!(order.total_amount, 1_200);
    assert!(order.lines[1].is_void);

    orders.void_order(order_id).unwrap();
    let order = orders.load_order(order_id).unwrap();
    assert!(order.is_void);
    assert_eq!(order.total_amount, 0);

    let err = orders.record_payment(order_id, 1).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));
}

#[test]
fn purchase_approval_credits_lots() {
    let app = App::new();
    let product_id = seed_product(&app, 0);

    let purchasing = app.purchasing();
    let purchase_id = purchasing
        .create_purchase(
            "MedSupply Co".to_string(),
            vec![
                PurchaseLine {
                    product_id,
                    batch_number: "P1".to_string(),
                    expiry_date: date(2028, 1, 31),
                    quantity: 100,
                    unit_cost: 60,
                },
                PurchaseLine {
                    product_id,
                    batch_number: "P2".to_string(),
                    expiry_date: date(2027, 3, 31),
                    quantity: 40,
                    unit_cost: 55,
                },
            ],
        )
        .unwrap();

    // Nothing lands before approval.
    assert_eq!(app.inventory().on_hand(product_id).unwrap(), 0);

    purchasing.approve_purchase(purchase_id, today()).unwrap();
    assert_eq!(app.inventory().on_hand(product_id).unwrap(), 140);

    let batches = app
        .inventory()
        .available_batches(product_id, today())
        .unwrap();
    let names: Vec<&str> = batches.iter().map(|b| b.batch_number.as_str()).collect();
    // Earliest expiry first.
    assert_eq!(names, vec!["P2", "P1"]);

    let purchase = purchasing.load_purchase(purchase_id).unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Approved);

    let err = purchasing.approve_purchase(purchase_id, today()).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));
}

#[test]
fn read_models_follow_the_bus() {
    let app = App::new();
    let subscription = app.bus.subscribe();
    let mut models = ReadModels::new();

    let product_id = seed_product(&app, 20);
    let order_id = seed_order(&app, product_id, 10);
    app.orders().approve_order(order_id, today()).unwrap();
    app.fulfillment()
        .record_dispatch(order_id, vec![row(product_id, "B1", 6)])
        .unwrap();

    let mut envelopes = Vec::new();
    while let Ok(envelope) = subscription.try_recv() {
        envelopes.push(envelope);
    }
    for envelope in &envelopes {
        models.apply_envelope(envelope);
    }
    // At-least-once delivery: redelivered envelopes must be no-ops.
    for envelope in &envelopes {
        models.apply_envelope(envelope);
    }

    let summaries = models.orders.list();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.status, OrderStatus::Approved);
    assert_eq!(summary.dispatched_amount, 600);
    assert_eq!(summary.outstanding_amount, 600);

    assert_eq!(models.stock.on_hand(product_id), 14);
    assert!(models.invoices.for_order(order_id).is_some());
    assert_eq!(models.products.active().len(), 1);
}

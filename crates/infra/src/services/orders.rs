//! Order lifecycle operations.

use chrono::{Datelike, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use pharmaflow_core::{Aggregate, DomainError, ExpectedVersion, PharmacyId};
use pharmaflow_events::{EventBus, EventEnvelope};
use pharmaflow_invoicing::{
    Invoice, InvoiceCommand, InvoiceId, IssueInvoice, format_invoice_number, invoice_number_prefix,
};
use pharmaflow_orders::{
    ApproveOrder, CreateOrder, NewOrderLine, Order, OrderCommand, OrderId, OrderStatus,
    RecordPayment, ReplaceLines, UpdateStatus, VoidLine, VoidOrder, format_order_number,
    order_number_prefix,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, rehydrate};
use crate::event_store::{EventStore, StreamAppend};
use crate::sequence::SequenceCounter;
use crate::streams::{INVOICE_STREAM, ORDER_STREAM};

use super::{publish_all, to_uncommitted, with_retry};

pub struct OrderService<S, B, Q> {
    dispatcher: CommandDispatcher<S, B>,
    counter: Q,
}

impl<S, B, Q> OrderService<S, B, Q>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    Q: SequenceCounter,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>, counter: Q) -> Self {
        Self { dispatcher, counter }
    }

    /// Create an order, assigning the next `ORD-YYYYMMDD-NNNN` number for
    /// `today`. Returns the id and the assigned number.
    pub fn create_order(
        &self,
        pharmacy_id: PharmacyId,
        lines: Vec<NewOrderLine>,
        salesman_name: String,
        terms: String,
        delivery_type: String,
        today: NaiveDate,
    ) -> Result<(OrderId, String), DispatchError> {
        let seq = self.counter.next(&order_number_prefix(today))?;
        let order_number = format_order_number(today, seq);
        let order_id = OrderId::new();

        let command = OrderCommand::Create(CreateOrder {
            order_id,
            pharmacy_id,
            order_number: order_number.clone(),
            lines,
            salesman_name,
            terms,
            delivery_type,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch::<Order>(order_id.into(), ORDER_STREAM, command, |id| {
                Order::empty(id.into())
            })?;

        tracing::info!(%order_id, %order_number, "order created");
        Ok((order_id, order_number))
    }

    pub fn replace_lines(
        &self,
        order_id: OrderId,
        lines: Vec<NewOrderLine>,
    ) -> Result<(), DispatchError> {
        with_retry("replace_lines", || {
            let command = OrderCommand::ReplaceLines(ReplaceLines {
                order_id,
                lines: lines.clone(),
                occurred_at: Utc::now(),
            });
            self.dispatch_order(order_id, command)
        })
    }

    /// Approve a pending order and issue its invoice in the same commit.
    ///
    /// The invoice number is assigned once, before the attempt loop, so a
    /// concurrency retry keeps the number it already drew. At-most-one
    /// invoice per order holds because approval is the only issuing path and
    /// a second approval fails the pending-status precondition.
    pub fn approve_order(
        &self,
        order_id: OrderId,
        today: NaiveDate,
    ) -> Result<(InvoiceId, String), DispatchError> {
        let seq = self.counter.next(&invoice_number_prefix(today.year()))?;
        let invoice_number = format_invoice_number(today.year(), seq);
        let invoice_id = InvoiceId::new();

        with_retry("approve_order", || {
            let occurred_at = Utc::now();
            let (order, order_version) =
                rehydrate::<Order, _>(self.dispatcher.store(), order_id.into(), |id| {
                    Order::empty(id.into())
                })?;
            let order_events = order.handle(&OrderCommand::Approve(ApproveOrder {
                order_id,
                occurred_at,
            }))?;

            let invoice = Invoice::empty(invoice_id);
            let invoice_events = invoice.handle(&InvoiceCommand::Issue(IssueInvoice {
                invoice_id,
                invoice_number: invoice_number.clone(),
                order_id,
                occurred_at,
            }))?;

            let committed = self.dispatcher.store().append_batch(vec![
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(order_version),
                    events: to_uncommitted(order_id.into(), ORDER_STREAM, &order_events)?,
                },
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: to_uncommitted(invoice_id.into(), INVOICE_STREAM, &invoice_events)?,
                },
            ])?;
            publish_all(self.dispatcher.bus(), &committed)
        })?;

        tracing::info!(%order_id, %invoice_number, "order approved, invoice issued");
        Ok((invoice_id, invoice_number))
    }

    pub fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), DispatchError> {
        with_retry("update_status", || {
            let command = OrderCommand::UpdateStatus(UpdateStatus {
                order_id,
                status,
                occurred_at: Utc::now(),
            });
            self.dispatch_order(order_id, command)
        })
    }

    /// Record a payment. Bounded by dispatched value, not order total:
    /// amounts above the collectible remainder are rejected by the aggregate.
    pub fn record_payment(&self, order_id: OrderId, amount: u64) -> Result<(), DispatchError> {
        with_retry("record_payment", || {
            let command = OrderCommand::RecordPayment(RecordPayment {
                order_id,
                amount,
                occurred_at: Utc::now(),
            });
            self.dispatch_order(order_id, command)
        })
    }

    pub fn void_order(&self, order_id: OrderId) -> Result<(), DispatchError> {
        with_retry("void_order", || {
            let command = OrderCommand::Void(VoidOrder {
                order_id,
                occurred_at: Utc::now(),
            });
            self.dispatch_order(order_id, command)
        })
    }

    pub fn void_line(&self, order_id: OrderId, line_no: u32) -> Result<(), DispatchError> {
        with_retry("void_line", || {
            let command = OrderCommand::VoidLine(VoidLine {
                order_id,
                line_no,
                occurred_at: Utc::now(),
            });
            self.dispatch_order(order_id, command)
        })
    }

    pub fn load_order(&self, order_id: OrderId) -> Result<Order, DispatchError> {
        let (order, _) = rehydrate::<Order, _>(self.dispatcher.store(), order_id.into(), |id| {
            Order::empty(id.into())
        })?;
        if !order.created {
            return Err(DispatchError::from(DomainError::NotFound));
        }
        Ok(order)
    }

    fn dispatch_order(&self, order_id: OrderId, command: OrderCommand) -> Result<(), DispatchError> {
        self.dispatcher
            .dispatch::<Order>(order_id.into(), ORDER_STREAM, command, |id| {
                Order::empty(id.into())
            })
            .map(|_| ())
    }
}

//! Dispatch and stock allocation.
//!
//! An allocation touches the order stream and one stock stream per product
//! involved. Both sides validate independently (remaining quantity on the
//! order, lot availability in stock) and the commit is all-or-nothing: if any
//! participant rejects, no stream moves.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value as JsonValue;

use pharmaflow_core::{Aggregate, ExpectedVersion};
use pharmaflow_events::{EventBus, EventEnvelope};
use pharmaflow_inventory::{BatchDebit, DebitBatches, ProductStock, StockCommand};
use pharmaflow_orders::{AllocateStock, AllocationRow, DispatchId, Order, OrderCommand, OrderId};
use pharmaflow_products::ProductId;

use crate::command_dispatcher::{CommandDispatcher, DispatchError, rehydrate};
use crate::event_store::{EventStore, StreamAppend};
use crate::streams::{ORDER_STREAM, STOCK_STREAM, stock_stream_id};

use super::{publish_all, to_uncommitted, with_retry};

pub struct FulfillmentService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
}

impl<S, B> FulfillmentService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>) -> Self {
        Self { dispatcher }
    }

    /// Dispatch a set of allocation rows as one grouped dispatch.
    pub fn record_dispatch(
        &self,
        order_id: OrderId,
        rows: Vec<AllocationRow>,
    ) -> Result<DispatchId, DispatchError> {
        let dispatch_id = DispatchId::new();
        self.allocate(order_id, Some(dispatch_id), rows)?;
        tracing::info!(%order_id, %dispatch_id, "dispatch recorded");
        Ok(dispatch_id)
    }

    /// Allocate a single batch row without grouping it into a dispatch.
    pub fn allocate_single(
        &self,
        order_id: OrderId,
        row: AllocationRow,
    ) -> Result<(), DispatchError> {
        self.allocate(order_id, None, vec![row])
    }

    fn allocate(
        &self,
        order_id: OrderId,
        dispatch_id: Option<DispatchId>,
        rows: Vec<AllocationRow>,
    ) -> Result<(), DispatchError> {
        with_retry("allocate_stock", || {
            let occurred_at = Utc::now();

            let (order, order_version) =
                rehydrate::<Order, _>(self.dispatcher.store(), order_id.into(), |id| {
                    Order::empty(id.into())
                })?;
            let order_events = order.handle(&OrderCommand::Allocate(AllocateStock {
                order_id,
                dispatch_id,
                rows: rows.clone(),
                occurred_at,
            }))?;

            let mut debits: BTreeMap<ProductId, Vec<BatchDebit>> = BTreeMap::new();
            for row in &rows {
                debits.entry(row.product_id).or_default().push(BatchDebit {
                    batch_number: row.batch_number.clone(),
                    expiry_date: row.expiry_date,
                    quantity: row.quantity,
                });
            }

            let mut appends = vec![StreamAppend {
                expected_version: ExpectedVersion::Exact(order_version),
                events: to_uncommitted(order_id.into(), ORDER_STREAM, &order_events)?,
            }];
            for (product_id, product_debits) in debits {
                let stream_id = stock_stream_id(product_id);
                let (stock, stock_version) =
                    rehydrate::<ProductStock, _>(self.dispatcher.store(), stream_id, |_| {
                        ProductStock::empty(product_id)
                    })?;
                let stock_events = stock.handle(&StockCommand::Debit(DebitBatches {
                    product_id,
                    debits: product_debits,
                    occurred_at,
                }))?;
                appends.push(StreamAppend {
                    expected_version: ExpectedVersion::Exact(stock_version),
                    events: to_uncommitted(stream_id, STOCK_STREAM, &stock_events)?,
                });
            }

            let committed = self.dispatcher.store().append_batch(appends)?;
            publish_all(self.dispatcher.bus(), &committed)
        })
    }
}

//! Stock ledger operations outside of fulfillment.

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;

use pharmaflow_events::{EventBus, EventEnvelope};
use pharmaflow_inventory::{
    AvailableBatch, ProductStock, ReceiveBatch, StockCommand, WriteOffBatch,
};
use pharmaflow_products::ProductId;

use crate::command_dispatcher::{CommandDispatcher, DispatchError, rehydrate};
use crate::event_store::EventStore;
use crate::streams::{STOCK_STREAM, stock_stream_id};

use super::with_retry;

pub struct InventoryService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
}

impl<S, B> InventoryService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>) -> Self {
        Self { dispatcher }
    }

    pub fn receive_batch(
        &self,
        product_id: ProductId,
        batch_number: String,
        expiry_date: NaiveDate,
        quantity: u32,
        received_date: NaiveDate,
    ) -> Result<(), DispatchError> {
        with_retry("receive_batch", || {
            let command = StockCommand::Receive(ReceiveBatch {
                product_id,
                batch_number: batch_number.clone(),
                expiry_date,
                quantity,
                received_date,
                occurred_at: Utc::now(),
            });
            self.dispatcher
                .dispatch::<ProductStock>(
                    stock_stream_id(product_id),
                    STOCK_STREAM,
                    command,
                    |_| ProductStock::empty(product_id),
                )
                .map(|_| ())
        })
    }

    pub fn write_off_batch(
        &self,
        product_id: ProductId,
        batch_number: String,
        expiry_date: NaiveDate,
        quantity: u32,
        reason: String,
    ) -> Result<(), DispatchError> {
        with_retry("write_off_batch", || {
            let command = StockCommand::WriteOff(WriteOffBatch {
                product_id,
                batch_number: batch_number.clone(),
                expiry_date,
                quantity,
                reason: reason.clone(),
                occurred_at: Utc::now(),
            });
            self.dispatcher
                .dispatch::<ProductStock>(
                    stock_stream_id(product_id),
                    STOCK_STREAM,
                    command,
                    |_| ProductStock::empty(product_id),
                )
                .map(|_| ())
        })
    }

    /// Current allocatable lots for a product, earliest expiry first.
    pub fn available_batches(
        &self,
        product_id: ProductId,
        today: NaiveDate,
    ) -> Result<Vec<AvailableBatch>, DispatchError> {
        let (stock, _) = rehydrate::<ProductStock, _>(
            self.dispatcher.store(),
            stock_stream_id(product_id),
            |_| ProductStock::empty(product_id),
        )?;
        Ok(stock.available_batches(today))
    }

    pub fn on_hand(&self, product_id: ProductId) -> Result<u64, DispatchError> {
        let (stock, _) = rehydrate::<ProductStock, _>(
            self.dispatcher.store(),
            stock_stream_id(product_id),
            |_| ProductStock::empty(product_id),
        )?;
        Ok(stock.on_hand())
    }
}

//! Inbound purchases.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;

use pharmaflow_core::{Aggregate, ExpectedVersion};
use pharmaflow_events::{EventBus, EventEnvelope};
use pharmaflow_inventory::{ProductStock, ReceiveBatch, StockCommand};
use pharmaflow_products::ProductId;
use pharmaflow_purchasing::{
    ApprovePurchase, CreatePurchase, MarkPurchasePaid, Purchase, PurchaseCommand, PurchaseId,
    PurchaseLine,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, rehydrate};
use crate::event_store::{EventStore, StreamAppend};
use crate::streams::{PURCHASE_STREAM, STOCK_STREAM, stock_stream_id};

use super::{publish_all, to_uncommitted, with_retry};

pub struct PurchaseService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
}

impl<S, B> PurchaseService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>) -> Self {
        Self { dispatcher }
    }

    pub fn create_purchase(
        &self,
        supplier_name: String,
        lines: Vec<PurchaseLine>,
    ) -> Result<PurchaseId, DispatchError> {
        let purchase_id = PurchaseId::new();
        let command = PurchaseCommand::Create(CreatePurchase {
            purchase_id,
            supplier_name,
            lines,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch::<Purchase>(purchase_id.into(), PURCHASE_STREAM, command, |id| {
                Purchase::empty(id.into())
            })?;
        Ok(purchase_id)
    }

    /// Approve a pending purchase and credit every line's lot into the stock
    /// ledger in the same commit.
    pub fn approve_purchase(
        &self,
        purchase_id: PurchaseId,
        received_date: NaiveDate,
    ) -> Result<(), DispatchError> {
        with_retry("approve_purchase", || {
            let occurred_at = Utc::now();

            let (purchase, purchase_version) =
                rehydrate::<Purchase, _>(self.dispatcher.store(), purchase_id.into(), |id| {
                    Purchase::empty(id.into())
                })?;
            let purchase_events = purchase.handle(&PurchaseCommand::Approve(ApprovePurchase {
                purchase_id,
                occurred_at,
            }))?;

            let mut by_product: BTreeMap<ProductId, Vec<&PurchaseLine>> = BTreeMap::new();
            for line in &purchase.lines {
                by_product.entry(line.product_id).or_default().push(line);
            }

            let mut appends = vec![StreamAppend {
                expected_version: ExpectedVersion::Exact(purchase_version),
                events: to_uncommitted(purchase_id.into(), PURCHASE_STREAM, &purchase_events)?,
            }];
            for (product_id, product_lines) in by_product {
                let stream_id = stock_stream_id(product_id);
                let (stock, stock_version) =
                    rehydrate::<ProductStock, _>(self.dispatcher.store(), stream_id, |_| {
                        ProductStock::empty(product_id)
                    })?;

                // Receipts within one purchase may hit the same lot; run them
                // against a working copy so each sees the previous credits.
                let mut working = stock;
                let mut stock_events = Vec::new();
                for line in product_lines {
                    let events = working.handle(&StockCommand::Receive(ReceiveBatch {
                        product_id,
                        batch_number: line.batch_number.clone(),
                        expiry_date: line.expiry_date,
                        quantity: line.quantity,
                        received_date,
                        occurred_at,
                    }))?;
                    for event in &events {
                        working.apply(event);
                    }
                    stock_events.extend(events);
                }

                appends.push(StreamAppend {
                    expected_version: ExpectedVersion::Exact(stock_version),
                    events: to_uncommitted(stream_id, STOCK_STREAM, &stock_events)?,
                });
            }

            let committed = self.dispatcher.store().append_batch(appends)?;
            publish_all(self.dispatcher.bus(), &committed)
        })?;

        tracing::info!(%purchase_id, "purchase approved, lots credited");
        Ok(())
    }

    /// Record supplier settlement. Independent of approval; a pending
    /// purchase can be paid and vice versa.
    pub fn mark_paid(&self, purchase_id: PurchaseId) -> Result<(), DispatchError> {
        with_retry("mark_purchase_paid", || {
            let command = PurchaseCommand::MarkPaid(MarkPurchasePaid {
                purchase_id,
                occurred_at: Utc::now(),
            });
            self.dispatcher
                .dispatch::<Purchase>(purchase_id.into(), PURCHASE_STREAM, command, |id| {
                    Purchase::empty(id.into())
                })
                .map(|_| ())
        })
    }

    pub fn load_purchase(&self, purchase_id: PurchaseId) -> Result<Purchase, DispatchError> {
        let (purchase, _) =
            rehydrate::<Purchase, _>(self.dispatcher.store(), purchase_id.into(), |id| {
                Purchase::empty(id.into())
            })?;
        if !purchase.created {
            return Err(DispatchError::from(pharmaflow_core::DomainError::NotFound));
        }
        Ok(purchase)
    }
}

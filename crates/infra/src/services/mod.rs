//! Application services.
//!
//! Single-aggregate commands go through the dispatcher as-is. Operations
//! spanning aggregates (dispatch debiting stock, approval issuing an
//! invoice, purchase approval crediting lots) rehydrate every participant,
//! run each decision, and commit all resulting events through one
//! `append_batch` so the whole operation lands or none of it does.
//!
//! Concurrency failures are retried a bounded number of times; everything
//! else is deterministic and surfaces immediately.

mod catalog;
mod fulfillment;
mod inventory;
mod orders;
mod purchasing;

pub use catalog::{CatalogService, NewProduct};
pub use fulfillment::FulfillmentService;
pub use inventory::InventoryService;
pub use orders::OrderService;
pub use purchasing::PurchaseService;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use pharmaflow_core::AggregateId;
use pharmaflow_events::{Event, EventBus, EventEnvelope};

use crate::command_dispatcher::DispatchError;
use crate::event_store::{StoredEvent, UncommittedEvent};

const MAX_CONCURRENCY_RETRIES: u32 = 3;

/// Run `op`, retrying on optimistic concurrency failures only.
fn with_retry<T>(
    operation: &'static str,
    mut op: impl FnMut() -> Result<T, DispatchError>,
) -> Result<T, DispatchError> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(DispatchError::Concurrency(reason)) if attempt + 1 < MAX_CONCURRENCY_RETRIES => {
                attempt += 1;
                tracing::warn!(operation, attempt, %reason, "retrying after concurrent modification");
            }
            other => return other,
        }
    }
}

fn to_uncommitted<E>(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    events: &[E],
) -> Result<Vec<UncommittedEvent>, DispatchError>
where
    E: Event + Serialize,
{
    events
        .iter()
        .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
        .collect::<Result<Vec<_>, _>>()
        .map_err(DispatchError::from)
}

fn publish_all<B>(bus: &B, committed: &[StoredEvent]) -> Result<(), DispatchError>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    for stored in committed {
        bus.publish(stored.to_envelope())
            .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
    }
    Ok(())
}

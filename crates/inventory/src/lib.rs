//! `pharmaflow-inventory` — batch-tracked stock ledger.
//!
//! One `ProductStock` aggregate per product. Lots are keyed by
//! (expiry date, batch number); the same batch number with two expiry dates
//! is two distinct lots and is never merged.

pub mod stock;

pub use stock::{
    AvailableBatch, BatchDebit, BatchKey, BatchReceived, BatchWrittenOff, BatchesDebited,
    DebitBatches, Lot, ProductStock, ReceiveBatch, StockCommand, StockEvent, WriteOffBatch,
};

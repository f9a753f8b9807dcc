//! Per-product stock ledger aggregate.
//!
//! The stream identity is the product id: all batch movements for a product
//! live in one stream, so availability checks and debits are serialized by the
//! store's optimistic concurrency on that stream.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pharmaflow_core::{Aggregate, AggregateRoot, DomainError};
use pharmaflow_events::Event;
use pharmaflow_products::ProductId;

// ─────────────────────────────────────────────────────────────────────────────
// Lots
// ─────────────────────────────────────────────────────────────────────────────

/// Lot key. Expiry first so BTreeMap iteration yields earliest-expiring lots.
pub type BatchKey = (NaiveDate, String);

/// A quantity of one product received together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub quantity: u32,
    pub received_date: NaiveDate,
}

/// Read view of one allocatable lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableBatch {
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub received_date: NaiveDate,
}

// ─────────────────────────────────────────────────────────────────────────────
// ProductStock Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Stock ledger for one product.
///
/// # Invariants
/// - Every lot quantity is >= 0 at all times (u32, debits bounds-checked).
/// - Lots are only credited by batch receipt and only debited by allocation
///   or explicit write-off.
/// - A debit request exceeding a lot's available quantity is rejected with no
///   mutation, including cumulative over-debit within one request.
#[derive(Debug, Clone)]
pub struct ProductStock {
    pub product_id: ProductId,
    pub lots: BTreeMap<BatchKey, Lot>,
    pub version: u64,
}

impl ProductStock {
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            lots: BTreeMap::new(),
            version: 0,
        }
    }

    /// Total on-hand quantity across all lots.
    pub fn on_hand(&self) -> u64 {
        self.lots.values().map(|lot| u64::from(lot.quantity)).sum()
    }

    /// Lots an operator may allocate from, earliest expiry first.
    ///
    /// Excludes empty lots and lots whose expiry date is in the past. The
    /// ordering steers operators toward earliest-expiring stock without
    /// forcing FIFO.
    pub fn available_batches(&self, today: NaiveDate) -> Vec<AvailableBatch> {
        self.lots
            .iter()
            .filter(|(_, lot)| lot.quantity > 0)
            .filter(|((expiry, _), _)| *expiry >= today)
            .map(|((expiry, batch_number), lot)| AvailableBatch {
                batch_number: batch_number.clone(),
                expiry_date: *expiry,
                quantity: lot.quantity,
                received_date: lot.received_date,
            })
            .collect()
    }

    pub fn quantity_of(&self, batch_number: &str, expiry_date: NaiveDate) -> u32 {
        self.lots
            .get(&(expiry_date, batch_number.to_string()))
            .map(|lot| lot.quantity)
            .unwrap_or(0)
    }
}

impl AggregateRoot for ProductStock {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Credit a lot. Re-receiving the same (batch, expiry) increments the lot;
/// the same batch number with a different expiry is a new lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveBatch {
    pub product_id: ProductId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub received_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// One row of a debit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDebit {
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
}

/// Debit one or more lots in a single all-or-nothing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitBatches {
    pub product_id: ProductId,
    pub debits: Vec<BatchDebit>,
    pub occurred_at: DateTime<Utc>,
}

/// Remove stock outside of fulfillment (damage, expiry disposal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOffBatch {
    pub product_id: ProductId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StockCommand {
    Receive(ReceiveBatch),
    Debit(DebitBatches),
    WriteOff(WriteOffBatch),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceived {
    pub product_id: ProductId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub received_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchesDebited {
    pub product_id: ProductId,
    pub debits: Vec<BatchDebit>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWrittenOff {
    pub product_id: ProductId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    Received(BatchReceived),
    Debited(BatchesDebited),
    WrittenOff(BatchWrittenOff),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::Received(_) => "inventory.batch.received",
            StockEvent::Debited(_) => "inventory.batch.debited",
            StockEvent::WrittenOff(_) => "inventory.batch.written_off",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::Received(e) => e.occurred_at,
            StockEvent::Debited(e) => e.occurred_at,
            StockEvent::WrittenOff(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for ProductStock {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::Received(e) => {
                let key = (e.expiry_date, e.batch_number.clone());
                let lot = self.lots.entry(key).or_insert(Lot {
                    quantity: 0,
                    received_date: e.received_date,
                });
                lot.quantity = lot.quantity.saturating_add(e.quantity);
            }
            StockEvent::Debited(e) => {
                for debit in &e.debits {
                    let key = (debit.expiry_date, debit.batch_number.clone());
                    if let Some(lot) = self.lots.get_mut(&key) {
                        lot.quantity = lot.quantity.saturating_sub(debit.quantity);
                    }
                }
            }
            StockEvent::WrittenOff(e) => {
                let key = (e.expiry_date, e.batch_number.clone());
                if let Some(lot) = self.lots.get_mut(&key) {
                    lot.quantity = lot.quantity.saturating_sub(e.quantity);
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::Receive(cmd) => self.handle_receive(cmd),
            StockCommand::Debit(cmd) => self.handle_debit(cmd),
            StockCommand::WriteOff(cmd) => self.handle_write_off(cmd),
        }
    }
}

impl ProductStock {
    fn ensure_own_product(&self, product_id: ProductId) -> Result<(), DomainError> {
        if product_id != self.product_id {
            return Err(DomainError::validation("product does not match this ledger"));
        }
        Ok(())
    }

    fn handle_receive(&self, cmd: &ReceiveBatch) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_own_product(cmd.product_id)?;
        if cmd.batch_number.trim().is_empty() {
            return Err(DomainError::validation("batch number cannot be empty"));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("received quantity must be positive"));
        }

        Ok(vec![StockEvent::Received(BatchReceived {
            product_id: cmd.product_id,
            batch_number: cmd.batch_number.trim().to_string(),
            expiry_date: cmd.expiry_date,
            quantity: cmd.quantity,
            received_date: cmd.received_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_debit(&self, cmd: &DebitBatches) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_own_product(cmd.product_id)?;
        if cmd.debits.is_empty() {
            return Err(DomainError::validation("debit request has no rows"));
        }

        // Validate cumulatively: several rows may target the same lot and
        // must not jointly exceed its availability.
        let mut pending: BTreeMap<BatchKey, u64> = BTreeMap::new();
        for debit in &cmd.debits {
            if debit.quantity == 0 {
                return Err(DomainError::validation("debit quantity must be positive"));
            }
            let key = (debit.expiry_date, debit.batch_number.clone());
            let available = self
                .lots
                .get(&key)
                .map(|lot| lot.quantity)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "batch {} (expiry {}) not found",
                        debit.batch_number, debit.expiry_date
                    ))
                })?;

            let taken = pending.entry(key.clone()).or_insert(0);
            *taken += u64::from(debit.quantity);
            if *taken > u64::from(available) {
                return Err(DomainError::validation(format!(
                    "insufficient stock in batch {} (expiry {}): requested {}, available {}",
                    debit.batch_number, debit.expiry_date, taken, available
                )));
            }
        }

        Ok(vec![StockEvent::Debited(BatchesDebited {
            product_id: cmd.product_id,
            debits: cmd.debits.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_write_off(&self, cmd: &WriteOffBatch) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_own_product(cmd.product_id)?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("write-off quantity must be positive"));
        }

        let available = self.quantity_of(&cmd.batch_number, cmd.expiry_date);
        if available == 0 {
            return Err(DomainError::validation(format!(
                "batch {} (expiry {}) not found or empty",
                cmd.batch_number, cmd.expiry_date
            )));
        }
        if cmd.quantity > available {
            return Err(DomainError::validation(format!(
                "cannot write off {} from batch {}: only {} available",
                cmd.quantity, cmd.batch_number, available
            )));
        }

        Ok(vec![StockEvent::WrittenOff(BatchWrittenOff {
            product_id: cmd.product_id,
            batch_number: cmd.batch_number.clone(),
            expiry_date: cmd.expiry_date,
            quantity: cmd.quantity,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn receive(stock: &mut ProductStock, batch: &str, expiry: NaiveDate, qty: u32) {
        let cmd = StockCommand::Receive(ReceiveBatch {
            product_id: stock.product_id,
            batch_number: batch.to_string(),
            expiry_date: expiry,
            quantity: qty,
            received_date: date(2026, 1, 10),
            occurred_at: now(),
        });
        for event in stock.handle(&cmd).unwrap() {
            stock.apply(&event);
        }
    }

    #[test]
    fn receive_creates_lot() {
        let mut stock = ProductStock::empty(ProductId::new());
        receive(&mut stock, "B100", date(2027, 6, 30), 50);

        assert_eq!(stock.on_hand(), 50);
        assert_eq!(stock.quantity_of("B100", date(2027, 6, 30)), 50);
    }

    #[test]
    fn same_batch_and_expiry_merges() {
        let mut stock = ProductStock::empty(ProductId::new());
        receive(&mut stock, "B100", date(2027, 6, 30), 50);
        receive(&mut stock, "B100", date(2027, 6, 30), 30);

        assert_eq!(stock.lots.len(), 1);
        assert_eq!(stock.quantity_of("B100", date(2027, 6, 30)), 80);
    }

    #[test]
    fn same_batch_different_expiry_is_distinct_lot() {
        let mut stock = ProductStock::empty(ProductId::new());
        receive(&mut stock, "B100", date(2027, 6, 30), 50);
        receive(&mut stock, "B100", date(2028, 1, 31), 20);

        assert_eq!(stock.lots.len(), 2);
        assert_eq!(stock.on_hand(), 70);
    }

    #[test]
    fn available_batches_sorted_by_expiry_excluding_expired_and_empty() {
        let mut stock = ProductStock::empty(ProductId::new());
        receive(&mut stock, "LATE", date(2028, 1, 1), 10);
        receive(&mut stock, "EARLY", date(2026, 9, 1), 10);
        receive(&mut stock, "EXPIRED", date(2025, 1, 1), 10);
        receive(&mut stock, "EMPTY", date(2027, 1, 1), 5);

        // Drain the EMPTY lot.
        let cmd = StockCommand::Debit(DebitBatches {
            product_id: stock.product_id,
            debits: vec![BatchDebit {
                batch_number: "EMPTY".to_string(),
                expiry_date: date(2027, 1, 1),
                quantity: 5,
            }],
            occurred_at: now(),
        });
        for event in stock.handle(&cmd).unwrap() {
            stock.apply(&event);
        }

        let today = date(2026, 8, 28);
        let available = stock.available_batches(today);
        let names: Vec<&str> = available.iter().map(|b| b.batch_number.as_str()).collect();
        assert_eq!(names, vec!["EARLY", "LATE"]);
    }

    #[test]
    fn debit_reduces_quantity() {
        let mut stock = ProductStock::empty(ProductId::new());
        receive(&mut stock, "B100", date(2027, 6, 30), 50);

        let cmd = StockCommand::Debit(DebitBatches {
            product_id: stock.product_id,
            debits: vec![BatchDebit {
                batch_number: "B100".to_string(),
                expiry_date: date(2027, 6, 30),
                quantity: 20,
            }],
            occurred_at: now(),
        });
        for event in stock.handle(&cmd).unwrap() {
            stock.apply(&event);
        }

        assert_eq!(stock.quantity_of("B100", date(2027, 6, 30)), 30);
    }

    #[test]
    fn over_debit_rejected_without_mutation() {
        let mut stock = ProductStock::empty(ProductId::new());
        receive(&mut stock, "B100", date(2027, 6, 30), 10);

        let cmd = StockCommand::Debit(DebitBatches {
            product_id: stock.product_id,
            debits: vec![BatchDebit {
                batch_number: "B100".to_string(),
                expiry_date: date(2027, 6, 30),
                quantity: 11,
            }],
            occurred_at: now(),
        });

        let err = stock.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("insufficient stock"));
        assert_eq!(stock.quantity_of("B100", date(2027, 6, 30)), 10);
    }

    #[test]
    fn cumulative_over_debit_within_one_request_rejected() {
        let mut stock = ProductStock::empty(ProductId::new());
        receive(&mut stock, "B100", date(2027, 6, 30), 10);

        // 6 + 6 > 10 even though each row alone fits.
        let cmd = StockCommand::Debit(DebitBatches {
            product_id: stock.product_id,
            debits: vec![
                BatchDebit {
                    batch_number: "B100".to_string(),
                    expiry_date: date(2027, 6, 30),
                    quantity: 6,
                },
                BatchDebit {
                    batch_number: "B100".to_string(),
                    expiry_date: date(2027, 6, 30),
                    quantity: 6,
                },
            ],
            occurred_at: now(),
        });

        let err = stock.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("insufficient stock"));
        assert_eq!(stock.on_hand(), 10);
    }

    #[test]
    fn debit_unknown_batch_rejected() {
        let stock = ProductStock::empty(ProductId::new());

        let cmd = StockCommand::Debit(DebitBatches {
            product_id: stock.product_id,
            debits: vec![BatchDebit {
                batch_number: "NOPE".to_string(),
                expiry_date: date(2027, 6, 30),
                quantity: 1,
            }],
            occurred_at: now(),
        });

        let err = stock.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn write_off_reduces_quantity() {
        let mut stock = ProductStock::empty(ProductId::new());
        receive(&mut stock, "B100", date(2025, 1, 1), 10);

        let cmd = StockCommand::WriteOff(WriteOffBatch {
            product_id: stock.product_id,
            batch_number: "B100".to_string(),
            expiry_date: date(2025, 1, 1),
            quantity: 10,
            reason: "expired".to_string(),
            occurred_at: now(),
        });
        for event in stock.handle(&cmd).unwrap() {
            stock.apply(&event);
        }

        assert_eq!(stock.on_hand(), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Receive(u8, u32),
            Debit(u8, u32),
            WriteOff(u8, u32),
        }

        fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
            proptest::collection::vec(
                prop_oneof![
                    (0u8..2, 1u32..50).prop_map(|(b, q)| Op::Receive(b, q)),
                    (0u8..2, 1u32..60).prop_map(|(b, q)| Op::Debit(b, q)),
                    (0u8..2, 1u32..60).prop_map(|(b, q)| Op::WriteOff(b, q)),
                ],
                1..40,
            )
        }

        fn lot_of(idx: u8) -> (&'static str, NaiveDate) {
            if idx == 0 {
                ("B1", NaiveDate::from_ymd_opt(2027, 6, 30).unwrap())
            } else {
                ("B2", NaiveDate::from_ymd_opt(2028, 1, 31).unwrap())
            }
        }

        proptest! {
            #[test]
            fn lots_track_credits_minus_accepted_debits(ops in arb_ops()) {
                let mut stock = ProductStock::empty(ProductId::new());
                let mut expected: BTreeMap<BatchKey, u32> = BTreeMap::new();

                for op in ops {
                    let (cmd, idx, delta) = match op {
                        Op::Receive(idx, qty) => {
                            let (batch, expiry) = lot_of(idx);
                            (StockCommand::Receive(ReceiveBatch {
                                product_id: stock.product_id,
                                batch_number: batch.to_string(),
                                expiry_date: expiry,
                                quantity: qty,
                                received_date: date(2026, 1, 10),
                                occurred_at: now(),
                            }), idx, qty as i64)
                        }
                        Op::Debit(idx, qty) => {
                            let (batch, expiry) = lot_of(idx);
                            (StockCommand::Debit(DebitBatches {
                                product_id: stock.product_id,
                                debits: vec![BatchDebit {
                                    batch_number: batch.to_string(),
                                    expiry_date: expiry,
                                    quantity: qty,
                                }],
                                occurred_at: now(),
                            }), idx, -(qty as i64))
                        }
                        Op::WriteOff(idx, qty) => {
                            let (batch, expiry) = lot_of(idx);
                            (StockCommand::WriteOff(WriteOffBatch {
                                product_id: stock.product_id,
                                batch_number: batch.to_string(),
                                expiry_date: expiry,
                                quantity: qty,
                                reason: "damage".to_string(),
                                occurred_at: now(),
                            }), idx, -(qty as i64))
                        }
                    };

                    let (batch, expiry) = lot_of(idx);
                    let key = (expiry, batch.to_string());
                    match stock.handle(&cmd) {
                        Ok(events) => {
                            for event in events {
                                stock.apply(&event);
                            }
                            let entry = expected.entry(key.clone()).or_insert(0);
                            *entry = (*entry as i64 + delta) as u32;
                        }
                        Err(_) => {
                            // A rejected command must not have mutated anything.
                        }
                    }

                    prop_assert_eq!(
                        stock.quantity_of(batch, expiry),
                        expected.get(&key).copied().unwrap_or(0)
                    );
                }

                let total: u64 = expected.values().map(|q| u64::from(*q)).sum();
                prop_assert_eq!(stock.on_hand(), total);
            }

            #[test]
            fn on_hand_never_exceeds_total_received(ops in arb_ops()) {
                let mut stock = ProductStock::empty(ProductId::new());
                let mut received: u64 = 0;

                for op in ops {
                    match op {
                        Op::Receive(idx, qty) => {
                            let (batch, expiry) = lot_of(idx);
                            receive(&mut stock, batch, expiry, qty);
                            received += u64::from(qty);
                        }
                        Op::Debit(idx, qty) => {
                            let (batch, expiry) = lot_of(idx);
                            let cmd = StockCommand::Debit(DebitBatches {
                                product_id: stock.product_id,
                                debits: vec![BatchDebit {
                                    batch_number: batch.to_string(),
                                    expiry_date: expiry,
                                    quantity: qty,
                                }],
                                occurred_at: now(),
                            });
                            if let Ok(events) = stock.handle(&cmd) {
                                for event in events {
                                    stock.apply(&event);
                                }
                            }
                        }
                        Op::WriteOff(idx, qty) => {
                            let (batch, expiry) = lot_of(idx);
                            let cmd = StockCommand::WriteOff(WriteOffBatch {
                                product_id: stock.product_id,
                                batch_number: batch.to_string(),
                                expiry_date: expiry,
                                quantity: qty,
                                reason: "damage".to_string(),
                                occurred_at: now(),
                            });
                            if let Ok(events) = stock.handle(&cmd) {
                                for event in events {
                                    stock.apply(&event);
                                }
                            }
                        }
                    }

                    prop_assert!(stock.on_hand() <= received);
                }
            }
        }
    }
}

//! Order aggregate (event-sourced).
//!
//! Monetary amounts are integer minor units (paise). Line pricing is
//! snapshotted at creation; catalog changes never affect existing orders.
//!
//! Derived quantities are recomputed inside `apply` at every mutation, never
//! adjusted by delta arithmetic from the outside:
//! - `total_amount` = sum of `total_price` over non-void lines
//! - `dispatched_amount` = sum over non-void lines of allocation qty x unit price
//! - `outstanding_amount` = dispatched - paid, floored at zero

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pharmaflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PharmacyId};
use pharmaflow_events::Event;
use pharmaflow_products::ProductId;

// ─────────────────────────────────────────────────────────────────────────────
// IDs
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! impl_order_uuid_newtype {
    ($t:ident) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl From<AggregateId> for $t {
            fn from(value: AggregateId) -> Self {
                Self(*value.as_uuid())
            }
        }

        impl From<$t> for AggregateId {
            fn from(value: $t) -> Self {
                AggregateId::from_uuid(value.0)
            }
        }
    };
}

impl_order_uuid_newtype!(OrderId);
impl_order_uuid_newtype!(DispatchId);
impl_order_uuid_newtype!(AllocationId);

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Order lifecycle status.
///
/// `approve` requires `Pending`; `update_status` accepts any member of this
/// enumeration without a strict adjacency graph (intentional flexibility for
/// operations staff). Terminal by convention: `Rejected`, `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Processing,
    Shipped,
    Delivered,
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
        };
        f.write_str(s)
    }
}

/// Derived from `paid_amount` vs `dispatched_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
}

// ─────────────────────────────────────────────────────────────────────────────
// Lines & Allocations
// ─────────────────────────────────────────────────────────────────────────────

/// A committed quantity from a specific stock batch to one order line.
///
/// Immutable after creation; corrections happen by new allocations, not
/// edits. `dispatch_id` is set when the allocation was created through the
/// grouped dispatch operation and `None` for the single-row path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub allocation_id: AllocationId,
    pub dispatch_id: Option<DispatchId>,
    pub line_no: u32,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
}

/// One order line with pricing snapshotted at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub free_qty: u32,
    /// Unit price at order creation, minor units.
    pub unit_price: u64,
    pub gst_rate_bps: u32,
    /// Absolute discount for the whole line, minor units.
    pub discount_amount: u64,
    /// `unit_price * quantity - discount_amount`, minor units.
    pub total_price: u64,
    pub is_void: bool,
    pub allocations: Vec<AllocationRecord>,
}

impl OrderLine {
    pub fn dispatched_quantity(&self) -> u32 {
        self.allocations.iter().map(|a| a.quantity).sum()
    }

    /// Ordered quantity not yet allocated. Never negative by construction.
    pub fn remaining_quantity(&self) -> u32 {
        self.quantity.saturating_sub(self.dispatched_quantity())
    }
}

/// Line input for order creation / line replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub free_qty: u32,
    pub unit_price: u64,
    pub gst_rate_bps: u32,
    pub discount_amount: u64,
}

/// One row of an allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub line_no: u32,
    /// Must match the targeted line's product (defense against picking a
    /// batch of the wrong product).
    pub product_id: ProductId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Order Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Order aggregate.
///
/// # Invariants
/// - `order_number` is immutable once set.
/// - `total_amount == Σ total_price` over non-void lines after every mutation.
/// - `paid_amount <= dispatched_amount()` always; payments violating this are
///   rejected with the collectible remainder.
/// - Per line, allocation quantities never exceed the ordered quantity.
/// - Voiding affects billable totals only; allocations stay untouched.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub pharmacy_id: PharmacyId,
    pub order_number: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub total_amount: u64,
    pub paid_amount: u64,
    pub payment_status: PaymentStatus,
    pub is_void: bool,
    pub salesman_name: String,
    pub terms: String,
    pub delivery_type: String,
    pub version: u64,
    pub created: bool,
}

impl Order {
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            pharmacy_id: PharmacyId::from_uuid(Uuid::nil()),
            order_number: String::new(),
            status: OrderStatus::Pending,
            lines: Vec::new(),
            total_amount: 0,
            paid_amount: 0,
            payment_status: PaymentStatus::Unpaid,
            is_void: false,
            salesman_name: String::new(),
            terms: String::new(),
            delivery_type: String::new(),
            version: 0,
            created: false,
        }
    }

    /// Value of quantities actually allocated, over non-void lines.
    ///
    /// Discounts are not re-applied here: dispatch value is unit price times
    /// dispatched quantity only.
    pub fn dispatched_amount(&self) -> u64 {
        self.lines
            .iter()
            .filter(|line| !line.is_void)
            .map(|line| u64::from(line.dispatched_quantity()) * line.unit_price)
            .sum()
    }

    /// Collectible balance: dispatched value minus payments, floored at zero.
    pub fn outstanding_amount(&self) -> u64 {
        self.dispatched_amount().saturating_sub(self.paid_amount)
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn has_allocations(&self) -> bool {
        self.lines.iter().any(|l| !l.allocations.is_empty())
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub pharmacy_id: PharmacyId,
    /// Pre-assigned by the sequence counter; immutable afterwards.
    pub order_number: String,
    pub lines: Vec<NewOrderLine>,
    pub salesman_name: String,
    /// Payment/delivery terms free text, carried onto the invoice.
    pub terms: String,
    pub delivery_type: String,
    pub occurred_at: DateTime<Utc>,
}

/// Replace all lines. Allowed only while zero allocations exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceLines {
    pub order_id: OrderId,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPayment {
    pub order_id: OrderId,
    /// Minor units; must be positive.
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidLine {
    pub order_id: OrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Allocate stock to lines, all rows or none.
///
/// `dispatch_id: Some(..)` groups the resulting allocations into one
/// dispatch; `None` is the single-row compatibility path. Both run identical
/// validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateStock {
    pub order_id: OrderId,
    pub dispatch_id: Option<DispatchId>,
    pub rows: Vec<AllocationRow>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderCommand {
    Create(CreateOrder),
    ReplaceLines(ReplaceLines),
    Approve(ApproveOrder),
    UpdateStatus(UpdateStatus),
    RecordPayment(RecordPayment),
    Void(VoidOrder),
    VoidLine(VoidLine),
    Allocate(AllocateStock),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub pharmacy_id: PharmacyId,
    pub order_number: String,
    pub lines: Vec<OrderLine>,
    pub total_amount: u64,
    pub salesman_name: String,
    pub terms: String,
    pub delivery_type: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesReplaced {
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
    pub total_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdated {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub order_id: OrderId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderVoided {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineVoided {
    pub order_id: OrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocated {
    pub order_id: OrderId,
    pub dispatch_id: Option<DispatchId>,
    pub allocations: Vec<AllocationRecord>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Created(OrderCreated),
    LinesReplaced(LinesReplaced),
    Approved(OrderApproved),
    StatusUpdated(StatusUpdated),
    PaymentRecorded(PaymentRecorded),
    Voided(OrderVoided),
    LineVoided(LineVoided),
    StockAllocated(StockAllocated),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "orders.order.created",
            OrderEvent::LinesReplaced(_) => "orders.order.lines_replaced",
            OrderEvent::Approved(_) => "orders.order.approved",
            OrderEvent::StatusUpdated(_) => "orders.order.status_updated",
            OrderEvent::PaymentRecorded(_) => "orders.order.payment_recorded",
            OrderEvent::Voided(_) => "orders.order.voided",
            OrderEvent::LineVoided(_) => "orders.order.line_voided",
            OrderEvent::StockAllocated(_) => "orders.order.stock_allocated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Created(e) => e.occurred_at,
            OrderEvent::LinesReplaced(e) => e.occurred_at,
            OrderEvent::Approved(e) => e.occurred_at,
            OrderEvent::StatusUpdated(e) => e.occurred_at,
            OrderEvent::PaymentRecorded(e) => e.occurred_at,
            OrderEvent::Voided(e) => e.occurred_at,
            OrderEvent::LineVoided(e) => e.occurred_at,
            OrderEvent::StockAllocated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Line construction
// ─────────────────────────────────────────────────────────────────────────────

fn build_lines(inputs: &[NewOrderLine]) -> Result<(Vec<OrderLine>, u64), DomainError> {
    if inputs.is_empty() {
        return Err(DomainError::validation("order must have at least one line"));
    }

    let mut lines = Vec::with_capacity(inputs.len());
    let mut total: u64 = 0;

    for (idx, input) in inputs.iter().enumerate() {
        let line_no = (idx + 1) as u32;
        if input.quantity == 0 {
            return Err(DomainError::validation(format!(
                "line {line_no}: quantity must be positive"
            )));
        }

        let gross = input
            .unit_price
            .checked_mul(u64::from(input.quantity))
            .ok_or_else(|| {
                DomainError::validation(format!("line {line_no}: amount overflow"))
            })?;
        let total_price = gross.checked_sub(input.discount_amount).ok_or_else(|| {
            DomainError::validation(format!(
                "line {line_no}: discount exceeds line value"
            ))
        })?;
        total = total.checked_add(total_price).ok_or_else(|| {
            DomainError::validation("order total overflow".to_string())
        })?;

        lines.push(OrderLine {
            line_no,
            product_id: input.product_id,
            product_name: input.product_name.clone(),
            quantity: input.quantity,
            free_qty: input.free_qty,
            unit_price: input.unit_price,
            gst_rate_bps: input.gst_rate_bps,
            discount_amount: input.discount_amount,
            total_price,
            is_void: false,
            allocations: Vec::new(),
        });
    }

    Ok((lines, total))
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Created(e) => self.apply_created(e),
            OrderEvent::LinesReplaced(e) => self.apply_lines_replaced(e),
            OrderEvent::Approved(_) => self.status = OrderStatus::Approved,
            OrderEvent::StatusUpdated(e) => self.status = e.status,
            OrderEvent::PaymentRecorded(e) => {
                self.paid_amount = self.paid_amount.saturating_add(e.amount);
            }
            OrderEvent::Voided(_) => self.apply_voided(),
            OrderEvent::LineVoided(e) => self.apply_line_voided(e),
            OrderEvent::StockAllocated(e) => self.apply_stock_allocated(e),
        }
        self.recompute_payment_status();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Create(cmd) => self.handle_create(cmd),
            OrderCommand::ReplaceLines(cmd) => self.handle_replace_lines(cmd),
            OrderCommand::Approve(cmd) => self.handle_approve(cmd),
            OrderCommand::UpdateStatus(cmd) => self.handle_update_status(cmd),
            OrderCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            OrderCommand::Void(cmd) => self.handle_void(cmd),
            OrderCommand::VoidLine(cmd) => self.handle_void_line(cmd),
            OrderCommand::Allocate(cmd) => self.handle_allocate(cmd),
        }
    }
}

impl Order {
    // ─────────────────────────────────────────────────────────────────────────
    // Command Handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn ensure_not_void(&self) -> Result<(), DomainError> {
        if self.is_void {
            return Err(DomainError::conflict("order is void"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }

        let (lines, total_amount) = build_lines(&cmd.lines)?;

        Ok(vec![OrderEvent::Created(OrderCreated {
            order_id: cmd.order_id,
            pharmacy_id: cmd.pharmacy_id,
            order_number: cmd.order_number.clone(),
            lines,
            total_amount,
            salesman_name: cmd.salesman_name.clone(),
            terms: cmd.terms.clone(),
            delivery_type: cmd.delivery_type.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replace_lines(&self, cmd: &ReplaceLines) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_not_void()?;

        // Line edits are blocked as soon as any stock has been committed.
        if let Some(blocking) = self
            .lines
            .iter()
            .flat_map(|l| l.allocations.iter())
            .next()
        {
            return Err(DomainError::conflict(format!(
                "cannot replace lines: allocation {} against batch {} already exists",
                blocking.allocation_id, blocking.batch_number
            )));
        }

        let (lines, total_amount) = build_lines(&cmd.lines)?;

        Ok(vec![OrderEvent::LinesReplaced(LinesReplaced {
            order_id: cmd.order_id,
            lines,
            total_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_not_void()?;
        if self.status != OrderStatus::Pending {
            return Err(DomainError::conflict(format!(
                "only pending orders can be approved (current status: {})",
                self.status
            )));
        }

        Ok(vec![OrderEvent::Approved(OrderApproved {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_status(&self, cmd: &UpdateStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_not_void()?;
        // Any member of the status enumeration is accepted; only `approve`
        // carries a precondition.
        Ok(vec![OrderEvent::StatusUpdated(StatusUpdated {
            order_id: cmd.order_id,
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(&self, cmd: &RecordPayment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_not_void()?;
        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let dispatched = self.dispatched_amount();
        let collectible = dispatched.saturating_sub(self.paid_amount);
        if cmd.amount > collectible {
            return Err(DomainError::validation(format!(
                "payment exceeds dispatched value: maximum collectible is {collectible}"
            )));
        }

        Ok(vec![OrderEvent::PaymentRecorded(PaymentRecorded {
            order_id: cmd.order_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        if self.is_void {
            return Err(DomainError::conflict("order is already void"));
        }

        Ok(vec![OrderEvent::Voided(OrderVoided {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void_line(&self, cmd: &VoidLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_not_void()?;

        let line = self.line(cmd.line_no).ok_or(DomainError::NotFound)?;
        if line.is_void {
            return Err(DomainError::conflict("line is already void"));
        }

        Ok(vec![OrderEvent::LineVoided(LineVoided {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateStock) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_not_void()?;
        if cmd.rows.is_empty() {
            return Err(DomainError::validation("allocation request has no rows"));
        }

        // Every row is validated before any is accepted. Several rows may
        // target the same line, so remaining quantity is tracked cumulatively
        // across the request.
        let mut remaining: Vec<(u32, u32)> = self
            .lines
            .iter()
            .map(|l| (l.line_no, l.remaining_quantity()))
            .collect();

        let mut allocations = Vec::with_capacity(cmd.rows.len());
        for row in &cmd.rows {
            if row.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "line {}: allocation quantity must be positive",
                    row.line_no
                )));
            }

            let line = self.line(row.line_no).ok_or_else(|| {
                DomainError::validation(format!(
                    "line {} does not belong to this order",
                    row.line_no
                ))
            })?;
            if line.is_void {
                return Err(DomainError::conflict(format!(
                    "line {} is void and cannot be dispatched",
                    row.line_no
                )));
            }
            if line.product_id != row.product_id {
                return Err(DomainError::validation(format!(
                    "line {}: batch product does not match line product",
                    row.line_no
                )));
            }

            let entry = remaining
                .iter_mut()
                .find(|(line_no, _)| *line_no == row.line_no)
                .ok_or(DomainError::NotFound)?;
            if row.quantity > entry.1 {
                return Err(DomainError::validation(format!(
                    "line {}: allocation of {} exceeds remaining quantity {}",
                    row.line_no, row.quantity, entry.1
                )));
            }
            entry.1 -= row.quantity;

            allocations.push(AllocationRecord {
                allocation_id: AllocationId::new(),
                dispatch_id: cmd.dispatch_id,
                line_no: row.line_no,
                batch_number: row.batch_number.clone(),
                expiry_date: row.expiry_date,
                quantity: row.quantity,
            });
        }

        Ok(vec![OrderEvent::StockAllocated(StockAllocated {
            order_id: cmd.order_id,
            dispatch_id: cmd.dispatch_id,
            allocations,
            occurred_at: cmd.occurred_at,
        })])
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Appliers
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_created(&mut self, e: &OrderCreated) {
        self.id = e.order_id;
        self.pharmacy_id = e.pharmacy_id;
        self.order_number = e.order_number.clone();
        self.status = OrderStatus::Pending;
        self.lines = e.lines.clone();
        self.total_amount = e.total_amount;
        self.paid_amount = 0;
        self.is_void = false;
        self.salesman_name = e.salesman_name.clone();
        self.terms = e.terms.clone();
        self.delivery_type = e.delivery_type.clone();
        self.created = true;
    }

    fn apply_lines_replaced(&mut self, e: &LinesReplaced) {
        self.lines = e.lines.clone();
        self.total_amount = e.total_amount;
    }

    fn apply_voided(&mut self) {
        self.is_void = true;
        for line in &mut self.lines {
            line.is_void = true;
        }
        self.total_amount = 0;
    }

    fn apply_line_voided(&mut self, e: &LineVoided) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
            line.is_void = true;
        }
        self.recompute_total();
    }

    fn apply_stock_allocated(&mut self, e: &StockAllocated) {
        for allocation in &e.allocations {
            if let Some(line) = self
                .lines
                .iter_mut()
                .find(|l| l.line_no == allocation.line_no)
            {
                line.allocations.push(allocation.clone());
            }
        }
    }

    fn recompute_total(&mut self) {
        self.total_amount = self
            .lines
            .iter()
            .filter(|l| !l.is_void)
            .map(|l| l.total_price)
            .sum();
    }

    fn recompute_payment_status(&mut self) {
        self.payment_status = if self.paid_amount == 0 {
            PaymentStatus::Unpaid
        } else if self.paid_amount >= self.dispatched_amount() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };
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

    fn line(product_id: ProductId, qty: u32, unit_price: u64) -> NewOrderLine {
        NewOrderLine {
            product_id,
            product_name: "Test Product".to_string(),
            quantity: qty,
            free_qty: 0,
            unit_price,
            gst_rate_bps: 1_200,
            discount_amount: 0,
        }
    }

    fn create_order(lines: Vec<NewOrderLine>) -> Order {
        let id = OrderId::new();
        let mut order = Order::empty(id);
        let cmd = OrderCommand::Create(CreateOrder {
            order_id: id,
            pharmacy_id: PharmacyId::new(),
            order_number: "ORD-20260828-0001".to_string(),
            lines,
            salesman_name: "R. Gupta".to_string(),
            terms: "net 30".to_string(),
            delivery_type: "courier".to_string(),
            occurred_at: now(),
        });
        for event in order.handle(&cmd).unwrap() {
            order.apply(&event);
        }
        order
    }

    fn allocate(
        order: &mut Order,
        dispatch_id: Option<DispatchId>,
        rows: Vec<AllocationRow>,
    ) -> Result<(), DomainError> {
        let cmd = OrderCommand::Allocate(AllocateStock {
            order_id: order.id,
            dispatch_id,
            rows,
            occurred_at: now(),
        });
        let events = order.handle(&cmd)?;
        for event in events {
            order.apply(&event);
        }
        Ok(())
    }

    fn row(line_no: u32, product_id: ProductId, batch: &str, qty: u32) -> AllocationRow {
        AllocationRow {
            line_no,
            product_id,
            batch_number: batch.to_string(),
            expiry_date: date(2027, 6, 30),
            quantity: qty,
        }
    }

    #[test]
    fn create_order_computes_line_totals() {
        let product = ProductId::new();
        let order = create_order(vec![NewOrderLine {
            discount_amount: 500,
            ..line(product, 10, 1_000)
        }]);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.lines[0].total_price, 9_500);
        assert_eq!(order.total_amount, 9_500);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn create_rejects_discount_exceeding_line_value() {
        let id = OrderId::new();
        let order = Order::empty(id);
        let cmd = OrderCommand::Create(CreateOrder {
            order_id: id,
            pharmacy_id: PharmacyId::new(),
            order_number: "ORD-20260828-0001".to_string(),
            lines: vec![NewOrderLine {
                discount_amount: 10_001,
                ..line(ProductId::new(), 10, 1_000)
            }],
            salesman_name: String::new(),
            terms: String::new(),
            delivery_type: String::new(),
            occurred_at: now(),
        });

        let err = order.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("discount"));
    }

    #[test]
    fn approve_pending_order_succeeds_once() {
        let mut order = create_order(vec![line(ProductId::new(), 10, 100)]);
        let cmd = OrderCommand::Approve(ApproveOrder {
            order_id: order.id,
            occurred_at: now(),
        });

        for event in order.handle(&cmd).unwrap() {
            order.apply(&event);
        }
        assert_eq!(order.status, OrderStatus::Approved);

        let err = order.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_status_accepts_any_member() {
        let mut order = create_order(vec![line(ProductId::new(), 10, 100)]);
        // Jumping straight to shipped is accepted.
        let cmd = OrderCommand::UpdateStatus(UpdateStatus {
            order_id: order.id,
            status: OrderStatus::Shipped,
            occurred_at: now(),
        });
        for event in order.handle(&cmd).unwrap() {
            order.apply(&event);
        }
        assert_eq!(order.status, OrderStatus::Shipped);
    }

    #[test]
    fn two_partial_dispatches_cover_the_line() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100)]);

        let d1 = DispatchId::new();
        allocate(&mut order, Some(d1), vec![row(1, product, "B1", 6)]).unwrap();
        let d2 = DispatchId::new();
        allocate(&mut order, Some(d2), vec![row(1, product, "B2", 4)]).unwrap();

        let l = &order.lines[0];
        assert_eq!(l.dispatched_quantity(), 10);
        assert_eq!(l.remaining_quantity(), 0);
        assert_eq!(order.dispatched_amount(), 1_000);

        let dispatch_ids: Vec<Option<DispatchId>> =
            l.allocations.iter().map(|a| a.dispatch_id).collect();
        assert_eq!(dispatch_ids, vec![Some(d1), Some(d2)]);
    }

    #[test]
    fn allocation_beyond_remaining_rejected() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100)]);
        allocate(&mut order, None, vec![row(1, product, "B1", 6)]).unwrap();

        let err = allocate(&mut order, None, vec![row(1, product, "B2", 5)]).unwrap_err();
        assert!(err.to_string().contains("exceeds remaining"));
        assert_eq!(order.lines[0].dispatched_quantity(), 6);
    }

    #[test]
    fn cumulative_allocation_within_one_request_bounded() {
        let product = ProductId::new();
        let order = create_order(vec![line(product, 10, 100)]);

        // 6 + 5 > 10 even though each row alone fits.
        let cmd = OrderCommand::Allocate(AllocateStock {
            order_id: order.id,
            dispatch_id: Some(DispatchId::new()),
            rows: vec![row(1, product, "B1", 6), row(1, product, "B2", 5)],
            occurred_at: now(),
        });

        let err = order.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("exceeds remaining"));
    }

    #[test]
    fn allocation_product_mismatch_rejected() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100)]);

        let err =
            allocate(&mut order, None, vec![row(1, ProductId::new(), "B1", 1)]).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn allocation_to_unknown_line_rejected() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100)]);

        let err = allocate(&mut order, None, vec![row(9, product, "B1", 1)]).unwrap_err();
        assert!(err.to_string().contains("does not belong"));
    }

    #[test]
    fn replace_lines_blocked_by_existing_allocation() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100)]);
        allocate(&mut order, None, vec![row(1, product, "B1", 2)]).unwrap();

        let cmd = OrderCommand::ReplaceLines(ReplaceLines {
            order_id: order.id,
            lines: vec![line(product, 5, 100)],
            occurred_at: now(),
        });

        let err = order.handle(&cmd).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("allocation"));
        assert!(msg.contains("B1"));
    }

    #[test]
    fn replace_lines_allowed_before_any_allocation() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100)]);

        let cmd = OrderCommand::ReplaceLines(ReplaceLines {
            order_id: order.id,
            lines: vec![line(product, 3, 200), line(product, 2, 50)],
            occurred_at: now(),
        });
        for event in order.handle(&cmd).unwrap() {
            order.apply(&event);
        }

        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.total_amount, 700);
    }

    #[test]
    fn payment_bounded_by_dispatched_value() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100)]);
        allocate(&mut order, None, vec![row(1, product, "B1", 10)]).unwrap();
        assert_eq!(order.dispatched_amount(), 1_000);

        let cmd = OrderCommand::RecordPayment(RecordPayment {
            order_id: order.id,
            amount: 1_100,
            occurred_at: now(),
        });
        let err = order.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(err.to_string().contains("maximum collectible is 1000"));
        assert_eq!(order.paid_amount, 0);
    }

    #[test]
    fn payments_accumulate_and_drive_payment_status() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100)]);
        allocate(&mut order, None, vec![row(1, product, "B1", 10)]).unwrap();

        let pay = |order: &mut Order, amount: u64| {
            let cmd = OrderCommand::RecordPayment(RecordPayment {
                order_id: order.id,
                amount,
                occurred_at: now(),
            });
            for event in order.handle(&cmd).unwrap() {
                order.apply(&event);
            }
        };

        pay(&mut order, 400);
        assert_eq!(order.payment_status, PaymentStatus::Partial);
        assert_eq!(order.outstanding_amount(), 600);

        pay(&mut order, 600);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.outstanding_amount(), 0);
    }

    #[test]
    fn payment_against_undispatched_order_rejected() {
        let order = create_order(vec![line(ProductId::new(), 10, 100)]);
        let cmd = OrderCommand::RecordPayment(RecordPayment {
            order_id: order.id,
            amount: 1,
            occurred_at: now(),
        });
        let err = order.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("maximum collectible is 0"));
    }

    #[test]
    fn void_order_zeroes_total_and_marks_lines() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100), line(product, 5, 40)]);
        allocate(&mut order, None, vec![row(1, product, "B1", 4)]).unwrap();

        let cmd = OrderCommand::Void(VoidOrder {
            order_id: order.id,
            occurred_at: now(),
        });
        for event in order.handle(&cmd).unwrap() {
            order.apply(&event);
        }

        assert!(order.is_void);
        assert_eq!(order.total_amount, 0);
        assert!(order.lines.iter().all(|l| l.is_void));
        // Physical fulfillment history is untouched.
        assert_eq!(order.lines[0].allocations.len(), 1);

        let err = order.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("already void"));
    }

    #[test]
    fn void_line_recomputes_total_from_survivors() {
        let product = ProductId::new();
        let mut order = create_order(vec![
            line(product, 10, 100), // 1000
            line(product, 5, 40),   // 200
            line(product, 2, 300),  // 600
        ]);
        allocate(&mut order, None, vec![row(2, product, "B1", 5)]).unwrap();
        assert_eq!(order.total_amount, 1_800);

        let cmd = OrderCommand::VoidLine(VoidLine {
            order_id: order.id,
            line_no: 2,
            occurred_at: now(),
        });
        for event in order.handle(&cmd).unwrap() {
            order.apply(&event);
        }

        assert_eq!(order.total_amount, 1_600);
        assert!(order.lines[1].is_void);
        // Allocations against the voided line stay in place.
        assert_eq!(order.lines[1].allocations.len(), 1);
        // But the voided line no longer counts toward dispatched value.
        assert_eq!(order.dispatched_amount(), 0);

        let err = order.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("already void"));
    }

    #[test]
    fn void_line_on_void_order_rejected() {
        let mut order = create_order(vec![line(ProductId::new(), 1, 100)]);
        let cmd = OrderCommand::Void(VoidOrder {
            order_id: order.id,
            occurred_at: now(),
        });
        for event in order.handle(&cmd).unwrap() {
            order.apply(&event);
        }

        let cmd = OrderCommand::VoidLine(VoidLine {
            order_id: order.id,
            line_no: 1,
            occurred_at: now(),
        });
        let err = order.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn allocation_against_void_line_rejected() {
        let product = ProductId::new();
        let mut order = create_order(vec![line(product, 10, 100), line(product, 5, 40)]);
        let cmd = OrderCommand::VoidLine(VoidLine {
            order_id: order.id,
            line_no: 1,
            occurred_at: now(),
        });
        for event in order.handle(&cmd).unwrap() {
            order.apply(&event);
        }

        let err = allocate(&mut order, None, vec![row(1, product, "B1", 1)]).unwrap_err();
        assert!(err.to_string().contains("void"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_lines() -> impl Strategy<Value = Vec<NewOrderLine>> {
            proptest::collection::vec(
                (1u32..50, 1u64..10_000, 0u64..100).prop_map(|(qty, price, discount)| {
                    let discount = discount.min(price * u64::from(qty));
                    NewOrderLine {
                        product_id: ProductId::new(),
                        product_name: "P".to_string(),
                        quantity: qty,
                        free_qty: 0,
                        unit_price: price,
                        gst_rate_bps: 0,
                        discount_amount: discount,
                    }
                }),
                1..6,
            )
        }

        proptest! {
            #[test]
            fn total_tracks_non_void_lines_under_void_sequences(
                lines in arb_lines(),
                void_seq in proptest::collection::vec(0u32..6, 0..6),
            ) {
                let mut order = create_order(lines);

                for line_no in void_seq {
                    let cmd = OrderCommand::VoidLine(VoidLine {
                        order_id: order.id,
                        line_no,
                        occurred_at: now(),
                    });
                    if let Ok(events) = order.handle(&cmd) {
                        for event in events {
                            order.apply(&event);
                        }
                    }
                }

                let expected: u64 = order
                    .lines
                    .iter()
                    .filter(|l| !l.is_void)
                    .map(|l| l.total_price)
                    .sum();
                prop_assert_eq!(order.total_amount, expected);
            }

            #[test]
            fn dispatched_never_exceeds_ordered(
                qty in 1u32..100,
                allocs in proptest::collection::vec(1u32..40, 1..8),
            ) {
                let product = ProductId::new();
                let mut order = create_order(vec![line(product, qty, 100)]);

                for a in allocs {
                    let _ = allocate(&mut order, None, vec![row(1, product, "B", a)]);
                }

                let l = &order.lines[0];
                prop_assert!(l.dispatched_quantity() <= l.quantity);
                prop_assert_eq!(
                    l.remaining_quantity(),
                    l.quantity - l.dispatched_quantity()
                );
            }
        }
    }
}

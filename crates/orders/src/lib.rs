//! `pharmaflow-orders` — order lifecycle, allocation and payment ledger.
//!
//! The `Order` aggregate owns the status state machine, line items with
//! pricing snapshotted at creation, allocation records (optionally grouped
//! into dispatches), the payment ledger bounded by dispatched value, and the
//! voiding rules that keep `total_amount` consistent with non-void lines.

pub mod number;
pub mod order;

pub use number::{format_order_number, order_number_prefix};
pub use order::{
    AllocationId, AllocationRecord, AllocationRow, AllocateStock, ApproveOrder, CreateOrder,
    DispatchId, LineVoided, LinesReplaced, NewOrderLine, Order, OrderCommand, OrderCreated,
    OrderEvent, OrderId, OrderLine, OrderStatus, OrderVoided, PaymentRecorded, PaymentStatus,
    RecordPayment, ReplaceLines, StatusUpdated, StockAllocated, UpdateStatus, VoidLine, VoidOrder,
};

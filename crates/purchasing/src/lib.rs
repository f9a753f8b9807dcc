//! `pharmaflow-purchasing` — inbound purchases.
//!
//! Approving a purchase is what credits batch lots into the stock ledger;
//! the credit happens atomically with the approval in the fulfillment
//! services.

pub mod purchase;

pub use purchase::{
    ApprovePurchase, CreatePurchase, MarkPurchasePaid, Purchase, PurchaseApproved, PurchaseCommand,
    PurchaseCreated, PurchaseEvent, PurchaseId, PurchaseLine, PurchaseMarkedPaid, PurchaseStatus,
};

//! `pharmaflow-invoicing` — invoice issuance.
//!
//! An invoice is issued lazily as a side effect of order approval, at most
//! one per order. Document rendering is out of scope; this crate owns the
//! numbered record only.

pub mod invoice;
pub mod number;

pub use invoice::{
    Invoice, InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceIssued, IssueInvoice,
};
pub use number::{format_invoice_number, invoice_number_prefix};

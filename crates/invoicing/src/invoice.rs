//! Invoice aggregate (event-sourced).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pharmaflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use pharmaflow_events::Event;
use pharmaflow_orders::OrderId;

/// Unique identifier for an invoice.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(Uuid);

impl InvoiceId {
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

impl Default for InvoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for InvoiceId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<InvoiceId> for Uuid {
    fn from(value: InvoiceId) -> Self {
        value.0
    }
}

impl From<AggregateId> for InvoiceId {
    fn from(value: AggregateId) -> Self {
        Self(*value.as_uuid())
    }
}

impl From<InvoiceId> for AggregateId {
    fn from(value: InvoiceId) -> Self {
        AggregateId::from_uuid(value.0)
    }
}

/// Invoice aggregate.
///
/// # Invariants
/// - `invoice_number` is immutable once set.
/// - An invoice is issued exactly once; re-issue is a conflict. At-most-one
///   invoice per order is enforced by issuing atomically with order approval.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub order_id: Option<OrderId>,
    pub version: u64,
    pub issued: bool,
}

impl Invoice {
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            invoice_number: String::new(),
            order_id: None,
            version: 0,
            issued: false,
        }
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub invoice_id: InvoiceId,
    /// Pre-assigned by the sequence counter; immutable afterwards.
    pub invoice_number: String,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InvoiceCommand {
    Issue(IssueInvoice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    Issued(InvoiceIssued),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::Issued(_) => "invoicing.invoice.issued",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::Issued(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::Issued(e) => {
                self.id = e.invoice_id;
                self.invoice_number = e.invoice_number.clone();
                self.order_id = Some(e.order_id);
                self.issued = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::Issue(cmd) => {
                if self.issued {
                    return Err(DomainError::conflict("invoice already issued"));
                }
                if cmd.invoice_number.trim().is_empty() {
                    return Err(DomainError::validation("invoice number cannot be empty"));
                }
                Ok(vec![InvoiceEvent::Issued(InvoiceIssued {
                    invoice_id: cmd.invoice_id,
                    invoice_number: cmd.invoice_number.clone(),
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_invoice_once() {
        let id = InvoiceId::new();
        let order_id = OrderId::new();
        let mut invoice = Invoice::empty(id);

        let cmd = InvoiceCommand::Issue(IssueInvoice {
            invoice_id: id,
            invoice_number: "INV-2026-0001".to_string(),
            order_id,
            occurred_at: Utc::now(),
        });

        for event in invoice.handle(&cmd).unwrap() {
            invoice.apply(&event);
        }
        assert!(invoice.issued);
        assert_eq!(invoice.invoice_number, "INV-2026-0001");
        assert_eq!(invoice.order_id, Some(order_id));

        let err = invoice.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("already issued"));
    }
}

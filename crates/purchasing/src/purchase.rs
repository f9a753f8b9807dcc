//! Purchase aggregate (event-sourced).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pharmaflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use pharmaflow_events::Event;
use pharmaflow_products::ProductId;

/// Unique identifier for a purchase.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(Uuid);

impl PurchaseId {
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

impl Default for PurchaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PurchaseId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<PurchaseId> for Uuid {
    fn from(value: PurchaseId) -> Self {
        value.0
    }
}

impl From<AggregateId> for PurchaseId {
    fn from(value: AggregateId) -> Self {
        Self(*value.as_uuid())
    }
}

impl From<PurchaseId> for AggregateId {
    fn from(value: PurchaseId) -> Self {
        AggregateId::from_uuid(value.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    #[default]
    Pending,
    Approved,
}

/// One inbound line. Batch number and expiry are mandatory: they become the
/// lot key when the purchase is approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: ProductId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    /// Cost per unit, minor units.
    pub unit_cost: u64,
}

/// Purchase aggregate.
///
/// # Invariants
/// - Only pending purchases can be approved; approval is idempotent-guarded.
/// - Lines are immutable after creation.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub id: PurchaseId,
    pub supplier_name: String,
    pub lines: Vec<PurchaseLine>,
    /// Derived: sum of quantity x unit cost, minor units.
    pub total_cost: u64,
    pub status: PurchaseStatus,
    /// Supplier settlement flag, independent of stock approval.
    pub is_paid: bool,
    pub version: u64,
    pub created: bool,
}

impl Purchase {
    pub fn empty(id: PurchaseId) -> Self {
        Self {
            id,
            supplier_name: String::new(),
            lines: Vec::new(),
            total_cost: 0,
            status: PurchaseStatus::Pending,
            is_paid: false,
            version: 0,
            created: false,
        }
    }
}

impl AggregateRoot for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchase {
    pub purchase_id: PurchaseId,
    pub supplier_name: String,
    pub lines: Vec<PurchaseLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovePurchase {
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPurchasePaid {
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PurchaseCommand {
    Create(CreatePurchase),
    Approve(ApprovePurchase),
    MarkPaid(MarkPurchasePaid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCreated {
    pub purchase_id: PurchaseId,
    pub supplier_name: String,
    pub lines: Vec<PurchaseLine>,
    pub total_cost: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseApproved {
    pub purchase_id: PurchaseId,
    pub lines: Vec<PurchaseLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseMarkedPaid {
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseEvent {
    Created(PurchaseCreated),
    Approved(PurchaseApproved),
    MarkedPaid(PurchaseMarkedPaid),
}

impl Event for PurchaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseEvent::Created(_) => "purchasing.purchase.created",
            PurchaseEvent::Approved(_) => "purchasing.purchase.approved",
            PurchaseEvent::MarkedPaid(_) => "purchasing.purchase.marked_paid",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseEvent::Created(e) => e.occurred_at,
            PurchaseEvent::Approved(e) => e.occurred_at,
            PurchaseEvent::MarkedPaid(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Purchase {
    type Command = PurchaseCommand;
    type Event = PurchaseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseEvent::Created(e) => {
                self.id = e.purchase_id;
                self.supplier_name = e.supplier_name.clone();
                self.lines = e.lines.clone();
                self.total_cost = e.total_cost;
                self.status = PurchaseStatus::Pending;
                self.created = true;
            }
            PurchaseEvent::Approved(_) => {
                self.status = PurchaseStatus::Approved;
            }
            PurchaseEvent::MarkedPaid(_) => {
                self.is_paid = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseCommand::Create(cmd) => self.handle_create(cmd),
            PurchaseCommand::Approve(cmd) => self.handle_approve(cmd),
            PurchaseCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
        }
    }
}

impl Purchase {
    fn handle_create(&self, cmd: &CreatePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("purchase already exists"));
        }
        if cmd.supplier_name.trim().is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "purchase must have at least one line",
            ));
        }

        let mut total: u64 = 0;
        for (idx, line) in cmd.lines.iter().enumerate() {
            let line_no = idx + 1;
            if line.batch_number.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "line {line_no}: batch number is required"
                )));
            }
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            let cost = line
                .unit_cost
                .checked_mul(u64::from(line.quantity))
                .and_then(|c| total.checked_add(c))
                .ok_or_else(|| {
                    DomainError::validation(format!("line {line_no}: cost overflow"))
                })?;
            total = cost;
        }

        Ok(vec![PurchaseEvent::Created(PurchaseCreated {
            purchase_id: cmd.purchase_id,
            supplier_name: cmd.supplier_name.trim().to_string(),
            lines: cmd.lines.clone(),
            total_cost: total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApprovePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if self.status != PurchaseStatus::Pending {
            return Err(DomainError::conflict("purchase is not pending"));
        }

        Ok(vec![PurchaseEvent::Approved(PurchaseApproved {
            purchase_id: cmd.purchase_id,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPurchasePaid) -> Result<Vec<PurchaseEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if self.is_paid {
            return Err(DomainError::conflict("purchase is already paid"));
        }

        Ok(vec![PurchaseEvent::MarkedPaid(PurchaseMarkedPaid {
            purchase_id: cmd.purchase_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

//! Product aggregate (event-sourced).
//!
//! Monetary amounts are integer minor units (paise); percentage rates are
//! basis points (1% = 100 bps).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pharmaflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use pharmaflow_events::Event;

// ─────────────────────────────────────────────────────────────────────────────
// Product ID
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Uuid);

impl ProductId {
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

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ProductId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<ProductId> for Uuid {
    fn from(value: ProductId) -> Self {
        value.0
    }
}

impl From<AggregateId> for ProductId {
    fn from(value: AggregateId) -> Self {
        Self(*value.as_uuid())
    }
}

impl From<ProductId> for AggregateId {
    fn from(value: ProductId) -> Self {
        AggregateId::from_uuid(value.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Pricing snapshot taken when an order line is created.
///
/// Order lines copy these values and are immune to later catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    /// Selling price per unit, minor units.
    pub unit_price: u64,
    pub gst_rate_bps: u32,
    pub default_discount_bps: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Product Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Product aggregate.
///
/// # Invariants
/// - `selling_price > 0` and `selling_price <= mrp`.
/// - Rates are bounded at 100% (10_000 bps).
/// - Inactive products cannot be snapshotted for new order lines.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Maximum retail price, minor units.
    pub mrp: u64,
    /// Selling price per unit, minor units.
    pub selling_price: u64,
    pub gst_rate_bps: u32,
    pub default_discount_bps: u32,
    /// e.g. "10x10" (strip layout); free-form.
    pub pack_size: String,
    /// e.g. "strip", "bottle", "vial".
    pub unit: String,
    pub is_active: bool,
    pub version: u64,
    pub created: bool,
}

impl Product {
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            mrp: 0,
            selling_price: 0,
            gst_rate_bps: 0,
            default_discount_bps: 0,
            pack_size: String::new(),
            unit: String::new(),
            is_active: false,
            version: 0,
            created: false,
        }
    }

    /// Snapshot current pricing for order-line creation.
    pub fn snapshot(&self) -> Result<ProductSnapshot, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if !self.is_active {
            return Err(DomainError::conflict("product is inactive"));
        }
        Ok(ProductSnapshot {
            product_id: self.id,
            name: self.name.clone(),
            unit_price: self.selling_price,
            gst_rate_bps: self.gst_rate_bps,
            default_discount_bps: self.default_discount_bps,
        })
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

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
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub mrp: u64,
    pub selling_price: u64,
    pub gst_rate_bps: u32,
    pub default_discount_bps: u32,
    pub pack_size: String,
    pub unit: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePricing {
    pub product_id: ProductId,
    pub mrp: u64,
    pub selling_price: u64,
    pub gst_rate_bps: u32,
    pub default_discount_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProductCommand {
    Create(CreateProduct),
    UpdatePricing(UpdatePricing),
    Deactivate(DeactivateProduct),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub mrp: u64,
    pub selling_price: u64,
    pub gst_rate_bps: u32,
    pub default_discount_bps: u32,
    pub pack_size: String,
    pub unit: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingUpdated {
    pub product_id: ProductId,
    pub mrp: u64,
    pub selling_price: u64,
    pub gst_rate_bps: u32,
    pub default_discount_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeactivated {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    Created(ProductCreated),
    PricingUpdated(PricingUpdated),
    Deactivated(ProductDeactivated),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Created(_) => "products.product.created",
            ProductEvent::PricingUpdated(_) => "products.product.pricing_updated",
            ProductEvent::Deactivated(_) => "products.product.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::Created(e) => e.occurred_at,
            ProductEvent::PricingUpdated(e) => e.occurred_at,
            ProductEvent::Deactivated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

const MAX_RATE_BPS: u32 = 10_000;

fn validate_pricing(
    mrp: u64,
    selling_price: u64,
    gst_rate_bps: u32,
    default_discount_bps: u32,
) -> Result<(), DomainError> {
    if selling_price == 0 {
        return Err(DomainError::validation("selling price must be positive"));
    }
    if selling_price > mrp {
        return Err(DomainError::validation("selling price cannot exceed MRP"));
    }
    if gst_rate_bps > MAX_RATE_BPS {
        return Err(DomainError::validation("gst rate cannot exceed 100%"));
    }
    if default_discount_bps > MAX_RATE_BPS {
        return Err(DomainError::validation("discount cannot exceed 100%"));
    }
    Ok(())
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::Created(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.mrp = e.mrp;
                self.selling_price = e.selling_price;
                self.gst_rate_bps = e.gst_rate_bps;
                self.default_discount_bps = e.default_discount_bps;
                self.pack_size = e.pack_size.clone();
                self.unit = e.unit.clone();
                self.is_active = true;
                self.created = true;
            }
            ProductEvent::PricingUpdated(e) => {
                self.mrp = e.mrp;
                self.selling_price = e.selling_price;
                self.gst_rate_bps = e.gst_rate_bps;
                self.default_discount_bps = e.default_discount_bps;
            }
            ProductEvent::Deactivated(_) => {
                self.is_active = false;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Create(cmd) => self.handle_create(cmd),
            ProductCommand::UpdatePricing(cmd) => self.handle_update_pricing(cmd),
            ProductCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl Product {
    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        validate_pricing(
            cmd.mrp,
            cmd.selling_price,
            cmd.gst_rate_bps,
            cmd.default_discount_bps,
        )?;

        Ok(vec![ProductEvent::Created(ProductCreated {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            mrp: cmd.mrp,
            selling_price: cmd.selling_price,
            gst_rate_bps: cmd.gst_rate_bps,
            default_discount_bps: cmd.default_discount_bps,
            pack_size: cmd.pack_size.clone(),
            unit: cmd.unit.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_pricing(&self, cmd: &UpdatePricing) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        validate_pricing(
            cmd.mrp,
            cmd.selling_price,
            cmd.gst_rate_bps,
            cmd.default_discount_bps,
        )?;

        Ok(vec![ProductEvent::PricingUpdated(PricingUpdated {
            product_id: cmd.product_id,
            mrp: cmd.mrp,
            selling_price: cmd.selling_price,
            gst_rate_bps: cmd.gst_rate_bps,
            default_discount_bps: cmd.default_discount_bps,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivateProduct,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if !self.is_active {
            return Err(DomainError::invariant("product already inactive"));
        }

        Ok(vec![ProductEvent::Deactivated(ProductDeactivated {
            product_id: cmd.product_id,
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

    fn create_cmd(id: ProductId) -> ProductCommand {
        ProductCommand::Create(CreateProduct {
            product_id: id,
            name: "Paracetamol 500mg".to_string(),
            mrp: 12_000,
            selling_price: 10_000,
            gst_rate_bps: 1_200,
            default_discount_bps: 500,
            pack_size: "10x10".to_string(),
            unit: "strip".to_string(),
            occurred_at: now(),
        })
    }

    fn created_product() -> Product {
        let id = ProductId::new();
        let mut product = Product::empty(id);
        for event in product.handle(&create_cmd(id)).unwrap() {
            product.apply(&event);
        }
        product
    }

    #[test]
    fn create_product_success() {
        let id = ProductId::new();
        let product = Product::empty(id);

        let events = product.handle(&create_cmd(id)).unwrap();
        assert_eq!(events.len(), 1);

        let ProductEvent::Created(e) = &events[0] else {
            panic!("expected ProductCreated event");
        };
        assert_eq!(e.name, "Paracetamol 500mg");
        assert_eq!(e.selling_price, 10_000);
    }

    #[test]
    fn create_rejects_price_above_mrp() {
        let id = ProductId::new();
        let product = Product::empty(id);

        let cmd = ProductCommand::Create(CreateProduct {
            product_id: id,
            name: "X".to_string(),
            mrp: 100,
            selling_price: 101,
            gst_rate_bps: 0,
            default_discount_bps: 0,
            pack_size: String::new(),
            unit: String::new(),
            occurred_at: now(),
        });

        let err = product.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("MRP"));
    }

    #[test]
    fn snapshot_copies_current_pricing() {
        let product = created_product();
        let snap = product.snapshot().unwrap();

        assert_eq!(snap.product_id, product.id);
        assert_eq!(snap.unit_price, 10_000);
        assert_eq!(snap.gst_rate_bps, 1_200);
    }

    #[test]
    fn snapshot_fails_for_inactive_product() {
        let mut product = created_product();
        let cmd = ProductCommand::Deactivate(DeactivateProduct {
            product_id: product.id,
            occurred_at: now(),
        });
        for event in product.handle(&cmd).unwrap() {
            product.apply(&event);
        }

        let err = product.snapshot().unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn pricing_update_does_not_touch_identity() {
        let mut product = created_product();
        let cmd = ProductCommand::UpdatePricing(UpdatePricing {
            product_id: product.id,
            mrp: 15_000,
            selling_price: 13_000,
            gst_rate_bps: 1_800,
            default_discount_bps: 0,
            occurred_at: now(),
        });
        for event in product.handle(&cmd).unwrap() {
            product.apply(&event);
        }

        assert_eq!(product.selling_price, 13_000);
        assert_eq!(product.name, "Paracetamol 500mg");
        assert_eq!(product.version, 2);
    }

    #[test]
    fn deactivate_twice_fails() {
        let mut product = created_product();
        let cmd = ProductCommand::Deactivate(DeactivateProduct {
            product_id: product.id,
            occurred_at: now(),
        });
        for event in product.handle(&cmd).unwrap() {
            product.apply(&event);
        }

        let err = product.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("inactive"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn valid_pricing_always_accepted(
                mrp in 1u64..1_000_000,
                discount_bps in 0u32..=10_000,
                gst_bps in 0u32..=10_000,
            ) {
                let selling = mrp; // selling at MRP is always valid
                prop_assert!(validate_pricing(mrp, selling, gst_bps, discount_bps).is_ok());
            }

            #[test]
            fn price_above_mrp_always_rejected(
                mrp in 1u64..1_000_000,
                excess in 1u64..1_000,
            ) {
                prop_assert!(validate_pricing(mrp, mrp + excess, 0, 0).is_err());
            }
        }
    }
}

use pharmaflow_auth::{PrincipalId, Role};
use pharmaflow_core::PharmacyId;

/// Principal context for a request (authenticated identity + roles).
///
/// `pharmacy_id` is the store binding carried by pharmacy portal tokens;
/// staff tokens have none and see all pharmacies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
    pharmacy_id: Option<PharmacyId>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>, pharmacy_id: Option<PharmacyId>) -> Self {
        Self {
            principal_id,
            roles,
            pharmacy_id,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn pharmacy_id(&self) -> Option<PharmacyId> {
        self.pharmacy_id
    }
}

//! API-side authorization guard for commands.
//!
//! Enforces authorization at the command boundary (before dispatch), keeping
//! domain aggregates and infra auth-agnostic.

use pharmaflow_auth::{
    AuthzError, CommandAuthorization, Grants, Permission, Principal, Role, authorize,
};

use crate::context::PrincipalContext;

/// Check authorization for a command in the current request context.
///
/// Intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let grants = Grants {
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
        pharmacy_id: principal.pharmacy_id(),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        grants,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Role→permission mapping.
///
/// Intentionally simple until a real policy source exists (e.g. DB-backed):
/// - `admin` grants everything
/// - `staff` grants the operational surface (catalog, stock, fulfillment,
///   payments, purchases)
/// - `pharmacy` grants order placement and reads for the bound store
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.as_str() == "admin") {
        return vec![Permission::new("*")];
    }

    let mut perms = Vec::new();
    if roles.iter().any(|r| r.as_str() == "staff") {
        perms.extend([
            Permission::new("products.write"),
            Permission::new("inventory.receive"),
            Permission::new("inventory.write_off"),
            Permission::new("orders.create"),
            Permission::new("orders.update"),
            Permission::new("orders.approve"),
            Permission::new("orders.payment"),
            Permission::new("orders.void"),
            Permission::new("orders.dispatch"),
            Permission::new("purchases.create"),
            Permission::new("purchases.approve"),
            Permission::new("purchases.pay"),
        ]);
    }
    if roles.iter().any(|r| r.as_str() == "pharmacy") {
        perms.push(Permission::new("orders.create"));
    }
    perms
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmaflow_auth::PrincipalId;

    struct Cmd(Vec<Permission>);

    impl CommandAuthorization for Cmd {
        fn required_permissions(&self) -> &[Permission] {
            &self.0
        }
    }

    fn ctx(role: &str) -> PrincipalContext {
        PrincipalContext::new(PrincipalId::new(), vec![Role::new(role.to_string())], None)
    }

    #[test]
    fn admin_can_do_anything() {
        let cmd = Cmd(vec![Permission::new("orders.void")]);
        assert!(authorize_command(&ctx("admin"), &cmd).is_ok());
    }

    #[test]
    fn pharmacy_cannot_approve() {
        let cmd = Cmd(vec![Permission::new("orders.approve")]);
        assert!(authorize_command(&ctx("pharmacy"), &cmd).is_err());
    }

    #[test]
    fn staff_can_dispatch() {
        let cmd = Cmd(vec![Permission::new("orders.dispatch")]);
        assert!(authorize_command(&ctx("staff"), &cmd).is_ok());
    }
}

use std::collections::HashSet;

use thiserror::Error;

use crate::{Grants, Permission, PrincipalId};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: the API layer derives grants from claims and a policy source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub grants: Grants,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implement this on commands that require permissions.
/// The API layer should enforce these requirements before dispatching.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal against a required permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal
        .grants
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn principal(perms: Vec<Permission>) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            grants: Grants {
                roles: vec![Role::new("manager")],
                permissions: perms,
                pharmacy_id: None,
            },
        }
    }

    #[test]
    fn explicit_permission_allows() {
        let p = principal(vec![Permission::new("orders.write")]);
        assert!(authorize(&p, &Permission::new("orders.write")).is_ok());
    }

    #[test]
    fn wildcard_allows_everything() {
        let p = principal(vec![Permission::new("*")]);
        assert!(authorize(&p, &Permission::new("inventory.write")).is_ok());
    }

    #[test]
    fn missing_permission_denied() {
        let p = principal(vec![Permission::new("orders.read")]);
        let err = authorize(&p, &Permission::new("orders.write")).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("orders.write".to_string()));
    }
}

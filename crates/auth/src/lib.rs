//! `pharmaflow-auth` — authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. Claims
//! validation is deterministic; token decoding lives in `token`.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use principal::{Grants, PrincipalId};
pub use roles::Role;
pub use token::{Hs256JwtValidator, JwtValidator, TokenDecodeError};

use axum::http::StatusCode;
use axum::response::Response;

use pharmaflow_auth::{CommandAuthorization, Permission};

use crate::app::errors::json_error;
use crate::authz::authorize_command;
use crate::context::PrincipalContext;

/// Pairs an inbound command (or request payload) with the permissions the
/// caller must hold to execute it.
pub struct CmdAuth<C> {
    pub inner: C,
    required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Vec<Permission>) -> Self {
        Self { inner, required }
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Authorization guard for handlers: returns the forbidden response to send
/// when the principal lacks a required permission.
pub fn require<C>(principal: &PrincipalContext, cmd: &CmdAuth<C>) -> Result<(), Response> {
    authorize_command(principal, cmd)
        .map_err(|_| json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"))
}

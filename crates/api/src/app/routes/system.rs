use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::{Value as JsonValue, json};

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Json<JsonValue> {
    let roles: Vec<&str> = principal.roles().iter().map(|r| r.as_str()).collect();
    Json(json!({
        "principal_id": principal.principal_id(),
        "roles": roles,
        "pharmacy_id": principal.pharmacy_id(),
    }))
}

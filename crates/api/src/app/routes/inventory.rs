use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use pharmaflow_auth::Permission;
use pharmaflow_products::ProductId;

use crate::app::dto::{ReceiveBatchRequest, WriteOffRequest, batch_to_json};
use crate::app::errors::{dispatch_error_to_response, json_error};
use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/:product_id/receipts", post(receive))
        .route("/:product_id/write-offs", post(write_off))
        .route("/:product_id/batches", get(batches))
        .route("/:product_id/on-hand", get(on_hand))
}

fn parse_id(raw: &str) -> Result<ProductId, Response> {
    Uuid::parse_str(raw)
        .map(ProductId::from_uuid)
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"))
}

async fn receive(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Json(req): Json<ReceiveBatchRequest>,
) -> Response {
    let product_id = match parse_id(&product_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("inventory.receive")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    let received_date = req.received_date.unwrap_or_else(|| Utc::now().date_naive());
    match services.inventory().receive_batch(
        product_id,
        req.batch_number,
        req.expiry_date,
        req.quantity,
        received_date,
    ) {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn write_off(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Json(req): Json<WriteOffRequest>,
) -> Response {
    let product_id = match parse_id(&product_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("inventory.write_off")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    match services.inventory().write_off_batch(
        product_id,
        req.batch_number,
        req.expiry_date,
        req.quantity,
        req.reason,
    ) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn batches(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> Response {
    let product_id = match parse_id(&product_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services
        .inventory()
        .available_batches(product_id, Utc::now().date_naive())
    {
        Ok(batches) => {
            let batches: Vec<_> = batches.iter().map(batch_to_json).collect();
            Json(json!({ "batches": batches })).into_response()
        }
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn on_hand(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> Response {
    let product_id = match parse_id(&product_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.inventory().on_hand(product_id) {
        Ok(on_hand) => Json(json!({ "on_hand": on_hand })).into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

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
use pharmaflow_purchasing::{PurchaseId, PurchaseLine};

use crate::app::dto::{ApprovePurchaseRequest, CreatePurchaseRequest, purchase_to_json};
use crate::app::errors::{dispatch_error_to_response, json_error};
use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/pending", get(pending))
        .route("/:id", get(get_one))
        .route("/:id/approve", post(approve))
        .route("/:id/paid", post(mark_paid))
}

fn parse_id(raw: &str) -> Result<PurchaseId, Response> {
    Uuid::parse_str(raw)
        .map(PurchaseId::from_uuid)
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid purchase id"))
}

async fn create(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<CreatePurchaseRequest>,
) -> Response {
    let cmd = CmdAuth::new(req, vec![Permission::new("purchases.create")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    let lines: Vec<PurchaseLine> = req
        .lines
        .into_iter()
        .map(|line| PurchaseLine {
            product_id: ProductId::from_uuid(line.product_id),
            batch_number: line.batch_number,
            expiry_date: line.expiry_date,
            quantity: line.quantity,
            unit_cost: line.unit_cost,
        })
        .collect();

    match services.purchasing().create_purchase(req.supplier_name, lines) {
        Ok(purchase_id) => (
            StatusCode::CREATED,
            Json(json!({ "purchase_id": purchase_id })),
        )
            .into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn list(Extension(services): Extension<Arc<AppServices>>) -> Response {
    read_model_list(&services, |models| {
        models.purchases.list().iter().map(|p| purchase_to_json(p)).collect()
    })
}

async fn pending(Extension(services): Extension<Arc<AppServices>>) -> Response {
    read_model_list(&services, |models| {
        models.purchases.pending().iter().map(|p| purchase_to_json(p)).collect()
    })
}

fn read_model_list(
    services: &AppServices,
    select: impl FnOnce(&pharmaflow_infra::ReadModels) -> Vec<serde_json::Value>,
) -> Response {
    let models = services.read_models();
    let models = match models.read() {
        Ok(models) => models,
        Err(_) => {
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "read_model_error",
                "read model unavailable",
            );
        }
    };
    Json(json!({ "purchases": select(&models) })).into_response()
}

async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let purchase_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.purchasing().load_purchase(purchase_id) {
        Ok(purchase) => Json(purchase_to_json(&purchase)).into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn approve(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(req): Json<ApprovePurchaseRequest>,
) -> Response {
    let purchase_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("purchases.approve")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    let received_date = req.received_date.unwrap_or_else(|| Utc::now().date_naive());
    match services.purchasing().approve_purchase(purchase_id, received_date) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn mark_paid(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let purchase_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new((), vec![Permission::new("purchases.pay")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }

    match services.purchasing().mark_paid(purchase_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use uuid::Uuid;

use pharmaflow_core::PharmacyId;
use pharmaflow_infra::ReadModels;
use pharmaflow_invoicing::{Invoice, InvoiceId};
use pharmaflow_orders::OrderId;

use crate::app::dto::invoice_to_json;
use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list))
        .route("/:id", get(get_one))
        .route("/by-order/:order_id", get(by_order))
}

/// Store-bound principals only see invoices for their own orders.
fn visible_to(models: &ReadModels, invoice: &Invoice, pharmacy_id: Option<PharmacyId>) -> bool {
    let Some(pharmacy_id) = pharmacy_id else {
        return true;
    };
    invoice
        .order_id
        .and_then(|order_id| models.orders.get(order_id))
        .is_some_and(|order| order.pharmacy_id == pharmacy_id)
}

fn read_models_unavailable() -> Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "read_model_error",
        "read model unavailable",
    )
}

async fn list(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
) -> Response {
    let models = services.read_models();
    let models = match models.read() {
        Ok(models) => models,
        Err(_) => return read_models_unavailable(),
    };
    let invoices: Vec<_> = models
        .invoices
        .list()
        .into_iter()
        .filter(|inv| visible_to(&models, inv, principal.pharmacy_id()))
        .map(|inv| invoice_to_json(inv))
        .collect();
    Json(json!({ "invoices": invoices })).into_response()
}

async fn get_one(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let invoice_id = match Uuid::parse_str(&id).map(InvoiceId::from_uuid) {
        Ok(id) => id,
        Err(_) => {
            return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id");
        }
    };
    let models = services.read_models();
    let models = match models.read() {
        Ok(models) => models,
        Err(_) => return read_models_unavailable(),
    };
    match models.invoices.get(invoice_id) {
        Some(invoice) if visible_to(&models, invoice, principal.pharmacy_id()) => {
            Json(invoice_to_json(invoice)).into_response()
        }
        _ => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
    }
}

async fn by_order(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
) -> Response {
    let order_id = match Uuid::parse_str(&order_id).map(OrderId::from_uuid) {
        Ok(id) => id,
        Err(_) => {
            return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id");
        }
    };
    let models = services.read_models();
    let models = match models.read() {
        Ok(models) => models,
        Err(_) => return read_models_unavailable(),
    };
    match models.invoices.for_order(order_id) {
        Some(invoice) if visible_to(&models, invoice, principal.pharmacy_id()) => {
            Json(invoice_to_json(invoice)).into_response()
        }
        _ => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
    }
}

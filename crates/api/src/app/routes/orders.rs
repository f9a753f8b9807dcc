use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use pharmaflow_auth::Permission;
use pharmaflow_core::PharmacyId;
use pharmaflow_orders::{AllocationRow, NewOrderLine, OrderId, OrderStatus};
use pharmaflow_products::ProductId;

use crate::app::dto::{
    AllocationRowRequest, CreateOrderRequest, DispatchRequest, OrderLineRequest,
    RecordPaymentRequest, ReplaceLinesRequest, UpdateStatusRequest, order_to_json,
};
use crate::app::errors::{dispatch_error_to_response, json_error};
use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/outstanding", get(outstanding))
        .route("/:id", get(get_one))
        .route("/:id/lines", put(replace_lines))
        .route("/:id/approve", post(approve))
        .route("/:id/status", put(update_status))
        .route("/:id/payments", post(record_payment))
        .route("/:id/void", post(void_order))
        .route("/:id/lines/:line_no/void", post(void_line))
        .route("/:id/dispatches", post(record_dispatch))
        .route("/:id/allocations", post(allocate_single))
}

fn parse_id(raw: &str) -> Result<OrderId, Response> {
    Uuid::parse_str(raw)
        .map(OrderId::from_uuid)
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"))
}

/// Pharmacy portal tokens are store-bound: they always order for their own
/// store and the body's `pharmacy_id` is ignored. Staff must name one.
fn resolve_pharmacy(
    principal: &PrincipalContext,
    requested: Option<Uuid>,
) -> Result<PharmacyId, Response> {
    if let Some(bound) = principal.pharmacy_id() {
        return Ok(bound);
    }
    requested.map(PharmacyId::from_uuid).ok_or_else(|| {
        json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "pharmacy_id is required",
        )
    })
}

/// Resolve request lines into priced order lines using current catalog
/// pricing. Prices are snapshotted here; later catalog changes do not touch
/// the order.
fn resolve_lines(
    services: &AppServices,
    requests: &[OrderLineRequest],
) -> Result<Vec<NewOrderLine>, Response> {
    let mut lines = Vec::with_capacity(requests.len());
    for req in requests {
        let product_id = ProductId::from_uuid(req.product_id);
        let snapshot = services
            .catalog()
            .product_snapshot(product_id)
            .map_err(dispatch_error_to_response)?;

        let subtotal = snapshot
            .unit_price
            .checked_mul(u64::from(req.quantity))
            .ok_or_else(|| {
                json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "line amount overflow",
                )
            })?;
        let discount_amount = match req.discount_amount {
            Some(amount) => amount,
            None => subtotal
                .checked_mul(u64::from(snapshot.default_discount_bps))
                .ok_or_else(|| {
                    json_error(
                        StatusCode::BAD_REQUEST,
                        "validation_error",
                        "discount overflow",
                    )
                })?
                / 10_000,
        };

        lines.push(NewOrderLine {
            product_id,
            product_name: snapshot.name,
            quantity: req.quantity,
            free_qty: req.free_qty,
            unit_price: snapshot.unit_price,
            gst_rate_bps: snapshot.gst_rate_bps,
            discount_amount,
        });
    }
    Ok(lines)
}

async fn create(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<CreateOrderRequest>,
) -> Response {
    let cmd = CmdAuth::new(req, vec![Permission::new("orders.create")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    let pharmacy_id = match resolve_pharmacy(&principal, req.pharmacy_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let lines = match resolve_lines(&services, &req.lines) {
        Ok(lines) => lines,
        Err(resp) => return resp,
    };

    match services.orders().create_order(
        pharmacy_id,
        lines,
        req.salesman_name,
        req.terms,
        req.delivery_type,
        Utc::now().date_naive(),
    ) {
        Ok((order_id, order_number)) => (
            StatusCode::CREATED,
            Json(json!({
                "order_id": order_id,
                "order_number": order_number,
            })),
        )
            .into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn list(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
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
    let orders = match principal.pharmacy_id() {
        Some(pharmacy_id) => models.orders.list_for_pharmacy(pharmacy_id),
        None => models.orders.list(),
    };
    Json(json!({ "orders": orders })).into_response()
}

async fn outstanding(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
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
    let mut orders = models.orders.with_outstanding_balance();
    if let Some(pharmacy_id) = principal.pharmacy_id() {
        orders.retain(|o| o.pharmacy_id == pharmacy_id);
    }
    Json(json!({ "orders": orders })).into_response()
}

async fn get_one(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let order = match services.orders().load_order(order_id) {
        Ok(order) => order,
        Err(err) => return dispatch_error_to_response(err),
    };
    // Store-bound principals only see their own orders.
    if let Some(pharmacy_id) = principal.pharmacy_id() {
        if order.pharmacy_id != pharmacy_id {
            return json_error(StatusCode::NOT_FOUND, "not_found", "not found");
        }
    }
    Json(order_to_json(&order)).into_response()
}

async fn replace_lines(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(req): Json<ReplaceLinesRequest>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("orders.update")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    // Non-admin staff may only edit orders still pending; admins may edit any
    // order the aggregate itself will accept.
    let is_admin = principal.roles().iter().any(|r| r.as_str() == "admin");
    if !is_admin {
        match services.orders().load_order(order_id) {
            Ok(order) if order.status != OrderStatus::Pending => {
                return json_error(
                    StatusCode::CONFLICT,
                    "conflict",
                    "only pending orders can be edited",
                );
            }
            Ok(_) => {}
            Err(err) => return dispatch_error_to_response(err),
        }
    }

    let lines = match resolve_lines(&services, &req.lines) {
        Ok(lines) => lines,
        Err(resp) => return resp,
    };
    match services.orders().replace_lines(order_id, lines) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn approve(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new((), vec![Permission::new("orders.approve")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }

    match services
        .orders()
        .approve_order(order_id, Utc::now().date_naive())
    {
        Ok((invoice_id, invoice_number)) => (
            StatusCode::CREATED,
            Json(json!({
                "invoice_id": invoice_id,
                "invoice_number": invoice_number,
            })),
        )
            .into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn update_status(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("orders.update")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    match services.orders().update_status(order_id, req.status) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn record_payment(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(req): Json<RecordPaymentRequest>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("orders.payment")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    match services.orders().record_payment(order_id, req.amount) {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn void_order(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new((), vec![Permission::new("orders.void")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }

    match services.orders().void_order(order_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn void_line(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, line_no)): Path<(String, u32)>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new((), vec![Permission::new("orders.void")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }

    match services.orders().void_line(order_id, line_no) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

fn allocation_row(req: &AllocationRowRequest) -> AllocationRow {
    AllocationRow {
        line_no: req.line_no,
        product_id: ProductId::from_uuid(req.product_id),
        batch_number: req.batch_number.clone(),
        expiry_date: req.expiry_date,
        quantity: req.quantity,
    }
}

async fn record_dispatch(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(req): Json<DispatchRequest>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("orders.dispatch")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    let rows: Vec<AllocationRow> = req.rows.iter().map(allocation_row).collect();
    match services.fulfillment().record_dispatch(order_id, rows) {
        Ok(dispatch_id) => (
            StatusCode::CREATED,
            Json(json!({ "dispatch_id": dispatch_id })),
        )
            .into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn allocate_single(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(req): Json<AllocationRowRequest>,
) -> Response {
    let order_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("orders.dispatch")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    match services
        .fulfillment()
        .allocate_single(order_id, allocation_row(&req))
    {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

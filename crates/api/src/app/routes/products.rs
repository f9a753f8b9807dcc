use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde_json::json;
use uuid::Uuid;

use pharmaflow_auth::Permission;
use pharmaflow_infra::NewProduct;
use pharmaflow_products::ProductId;

use crate::app::dto::{CreateProductRequest, UpdatePricingRequest, product_to_json};
use crate::app::errors::{dispatch_error_to_response, json_error};
use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one))
        .route("/:id/pricing", put(update_pricing))
        .route("/:id/deactivate", post(deactivate))
}

fn parse_id(raw: &str) -> Result<ProductId, Response> {
    Uuid::parse_str(raw)
        .map(ProductId::from_uuid)
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"))
}

async fn create(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<CreateProductRequest>,
) -> Response {
    let cmd = CmdAuth::new(req, vec![Permission::new("products.write")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    let input = NewProduct {
        name: req.name,
        mrp: req.mrp,
        selling_price: req.selling_price,
        gst_rate_bps: req.gst_rate_bps,
        default_discount_bps: req.default_discount_bps,
        pack_size: req.pack_size,
        unit: req.unit,
    };
    match services.catalog().create_product(input) {
        Ok(product_id) => (
            StatusCode::CREATED,
            Json(json!({ "product_id": product_id })),
        )
            .into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn list(Extension(services): Extension<Arc<AppServices>>) -> Response {
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
    let products: Vec<_> = models.products.active().iter().map(|p| product_to_json(p)).collect();
    Json(json!({ "products": products })).into_response()
}

async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let product_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog().load_product(product_id) {
        Ok(product) => Json(product_to_json(&product)).into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn update_pricing(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePricingRequest>,
) -> Response {
    let product_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(req, vec![Permission::new("products.write")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }
    let req = cmd.inner;

    match services.catalog().update_pricing(
        product_id,
        req.mrp,
        req.selling_price,
        req.gst_rate_bps,
        req.default_discount_bps,
    ) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn deactivate(
    Extension(principal): Extension<PrincipalContext>,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let product_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new((), vec![Permission::new("products.write")]);
    if let Err(resp) = require(&principal, &cmd) {
        return resp;
    }

    match services.catalog().deactivate_product(product_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

use axum::{Router, routing::get};

pub mod common;
pub mod inventory;
pub mod invoices;
pub mod orders;
pub mod products;
pub mod purchases;
pub mod system;

/// Protected routes. `/health` is mounted unauthenticated in `build_app`.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/orders", orders::router())
        .nest("/purchases", purchases::router())
        .nest("/invoices", invoices::router())
}

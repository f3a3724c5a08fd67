use axum::{Router, routing::get};

pub mod admin;
pub mod common;
pub mod employees;
pub mod inventory;
pub mod production_orders;
pub mod products;
pub mod sales_orders;
pub mod suppliers;
pub mod supplies;
pub mod system;

/// Router for every `/api` endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/stream", get(system::stream))
        .nest("/inventory", inventory::router())
        .nest("/products", products::router())
        .nest("/supplies", supplies::router())
        .nest("/suppliers", suppliers::router())
        .nest("/employees", employees::router())
        .nest("/sales-orders", sales_orders::router())
        .nest("/production-orders", production_orders::router())
        .nest("/admin", admin::router())
}

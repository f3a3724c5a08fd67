//! Production runs: supplies in, finished product out.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use chrono::Utc;
use serde_json::json;

use pansoft_core::ProductionOrderId;
use pansoft_production::{
    ChangeProductionOrderStatus, NewProductionOrder, ProductionOrderStatus, SupplyUsage,
};

use crate::app::dto;
use crate::app::errors::{domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(change_status))
}

pub async fn list_orders(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let orders = services
        .store()
        .list_production_orders()
        .await
        .map_err(store_error_to_response)?;
    let data: Vec<_> = orders.iter().map(dto::production_order_to_json).collect();
    Ok(Json(data).into_response())
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateProductionOrderRequest>, JsonRejection>,
) -> ApiResult {
    let body = common::body(body)?;
    let input = NewProductionOrder {
        product_id: body.product_id,
        quantity: body.quantity,
        supplies: body
            .supplies
            .into_iter()
            .map(|u| SupplyUsage {
                supply_id: u.supply_id,
                quantity: u.quantity,
            })
            .collect(),
        notes: body.notes,
    };

    let order = services
        .store()
        .create_production_order(input)
        .await
        .map_err(store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(dto::production_order_to_json(&order))).into_response())
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: ProductionOrderId = common::parse_id(&id, "production order")?;
    let order = services
        .store()
        .get_production_order(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::production_order_to_json(&order)).into_response())
}

/// PATCH /api/production-orders/:id/status
///
/// Completing a run consumes its supplies and adds the product in one
/// atomic batch.
pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::ChangeStatusRequest>, JsonRejection>,
) -> ApiResult {
    let order_id: ProductionOrderId = common::parse_id(&id, "production order")?;
    let body = common::body(body)?;
    let status: ProductionOrderStatus =
        body.status.parse().map_err(domain_error_to_response)?;

    let change = services
        .store()
        .change_production_order_status(ChangeProductionOrderStatus {
            order_id,
            status,
            user_id: body.user_id,
            occurred_at: Utc::now(),
        })
        .await
        .map_err(store_error_to_response)?;

    services.publish_movements(&change.movements);
    services.publish(
        "production_order.status_changed",
        json!({
            "order_id": change.order.id,
            "status": change.order.status,
            "inventory_updated": change.inventory_updated(),
        }),
    );

    let order = dto::production_order_to_json(&change.order);
    Ok(Json(dto::status_change_to_json(&change, order)).into_response())
}

//! Sales orders and their status lifecycle.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use chrono::Utc;
use serde_json::json;

use pansoft_core::SalesOrderId;
use pansoft_sales::{ChangeSalesOrderStatus, NewOrderLine, NewSalesOrder, SalesOrderStatus};

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

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::StatusQuery>, QueryRejection>,
) -> ApiResult {
    let query = common::query(query)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SalesOrderStatus>)
        .transpose()
        .map_err(domain_error_to_response)?;

    let orders = services
        .store()
        .list_sales_orders(status)
        .await
        .map_err(store_error_to_response)?;
    let data: Vec<_> = orders.iter().map(dto::sales_order_to_json).collect();
    Ok(Json(data).into_response())
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateSalesOrderRequest>, JsonRejection>,
) -> ApiResult {
    let body = common::body(body)?;
    let input = NewSalesOrder {
        customer_name: body.customer_name,
        delivery_date: body.delivery_date,
        notes: body.notes,
        lines: body
            .lines
            .into_iter()
            .map(|l| NewOrderLine {
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
            .collect(),
    };

    let order = services
        .store()
        .create_sales_order(input)
        .await
        .map_err(store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(dto::sales_order_to_json(&order))).into_response())
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: SalesOrderId = common::parse_id(&id, "sales order")?;
    let order = services
        .store()
        .get_sales_order(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::sales_order_to_json(&order)).into_response())
}

/// PATCH /api/sales-orders/:id/status
///
/// Delivering consumes the lines' stock; cancelling a delivered order
/// returns it. `inventoryUpdated` tells whether stock moved.
pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::ChangeStatusRequest>, JsonRejection>,
) -> ApiResult {
    let order_id: SalesOrderId = common::parse_id(&id, "sales order")?;
    let body = common::body(body)?;
    let status: SalesOrderStatus = body.status.parse().map_err(domain_error_to_response)?;

    let change = services
        .store()
        .change_sales_order_status(ChangeSalesOrderStatus {
            order_id,
            status,
            user_id: body.user_id,
            occurred_at: Utc::now(),
        })
        .await
        .map_err(store_error_to_response)?;

    services.publish_movements(&change.movements);
    services.publish(
        "sales_order.status_changed",
        json!({
            "order_id": change.order.id,
            "status": change.order.status,
            "inventory_updated": change.inventory_updated(),
        }),
    );

    let order = dto::sales_order_to_json(&change.order);
    Ok(Json(dto::status_change_to_json(&change, order)).into_response())
}

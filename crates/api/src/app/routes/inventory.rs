//! Finished-goods stock: levels, movements and history.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use pansoft_core::ProductId;
use pansoft_infra::{CatalogFilter, MovementQuery};
use pansoft_inventory::{StockSubject, SubjectKind};

use crate::app::dto;
use crate::app::errors::store_error_to_response;
use crate::app::routes::common::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/history/all/movements", get(product_history))
        .route("/:product_id", get(get_stock).put(record_product_movement))
        .route("/:product_id/movements", get(product_movements))
}

/// Movement history page for `base`, with the request's paging and filters.
pub(crate) async fn movement_history(
    services: &AppServices,
    base: MovementQuery,
    query: dto::HistoryQuery,
) -> ApiResult {
    let query = base
        .with_limit(query.limit)
        .with_offset(query.offset)
        .with_type(query.movement_type);
    let page = services
        .store()
        .list_movements(query)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::movement_page_to_json(&page)).into_response())
}

pub async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::CatalogQuery>, QueryRejection>,
) -> ApiResult {
    let query = common::query(query)?;
    let products = services
        .store()
        .list_products(CatalogFilter {
            include_inactive: query.include_inactive,
            low_stock_only: query.low_stock,
        })
        .await
        .map_err(store_error_to_response)?;
    let data: Vec<_> = products.iter().map(dto::product_to_json).collect();
    Ok(Json(data).into_response())
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: ProductId = common::parse_id(&id, "product")?;
    let product = services
        .store()
        .get_product(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::product_to_json(&product)).into_response())
}

/// PUT /api/inventory/:productId
///
/// Records one movement and returns the updated product with it.
pub async fn record_product_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::RecordMovementRequest>, JsonRejection>,
) -> ApiResult {
    let id: ProductId = common::parse_id(&id, "product")?;
    let body = common::body(body)?;

    let movements = services
        .store()
        .record_movements(vec![body.into_command(StockSubject::Product(id))])
        .await
        .map_err(store_error_to_response)?;
    services.publish_movements(&movements);

    let mut product = services
        .store()
        .get_product(id)
        .await
        .map_err(store_error_to_response)?;
    let movement = movements.first();
    // Another write may land before the re-read; report this movement's result.
    if let Some(m) = movement {
        product.quantity = m.new_quantity;
    }
    Ok(Json(json!({
        "product": dto::product_to_json(&product),
        "movement": movement.map(dto::movement_to_json),
    }))
    .into_response())
}

pub async fn product_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    query: Result<Query<dto::HistoryQuery>, QueryRejection>,
) -> ApiResult {
    let id: ProductId = common::parse_id(&id, "product")?;
    let query = common::query(query)?;
    // 404 for unknown products instead of an empty page.
    services
        .store()
        .get_product(id)
        .await
        .map_err(store_error_to_response)?;
    movement_history(
        &services,
        MovementQuery::for_subject(StockSubject::Product(id)),
        query,
    )
    .await
}

/// GET /api/inventory/history/all/movements
pub async fn product_history(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::HistoryQuery>, QueryRejection>,
) -> ApiResult {
    let query = common::query(query)?;
    movement_history(&services, MovementQuery::for_kind(SubjectKind::Product), query).await
}

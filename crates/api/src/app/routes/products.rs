//! Product catalog CRUD. Stock changes go through `/inventory`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use pansoft_core::ProductId;
use pansoft_infra::CatalogFilter;
use pansoft_products::{NewProduct, ProductUpdate};

use crate::app::dto;
use crate::app::errors::store_error_to_response;
use crate::app::routes::common::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(deactivate_product),
        )
}

pub async fn list_products(
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

/// POST /api/products
///
/// A positive `quantity` is recorded as the opening `entrada`.
pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateProductRequest>, JsonRejection>,
) -> ApiResult {
    let body = common::body(body)?;
    let input = NewProduct {
        sku: body.sku,
        name: body.name,
        description: body.description,
        price: body.price,
        unit: body.unit,
        initial_quantity: body.quantity,
        min_stock: body.min_stock,
    };

    let (product, movement) = services
        .store()
        .create_product(input, body.user_id)
        .await
        .map_err(store_error_to_response)?;
    if let Some(m) = &movement {
        services.publish_movements(std::slice::from_ref(m));
    }
    services.publish("product.created", dto::product_to_json(&product));

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "product": dto::product_to_json(&product),
            "movement": movement.as_ref().map(dto::movement_to_json),
        })),
    )
        .into_response())
}

pub async fn get_product(
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

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateProductRequest>, JsonRejection>,
) -> ApiResult {
    let id: ProductId = common::parse_id(&id, "product")?;
    let body = common::body(body)?;
    let update = ProductUpdate {
        sku: body.sku,
        name: body.name,
        description: body.description,
        price: body.price,
        unit: body.unit,
        min_stock: body.min_stock,
        active: body.active,
    };

    let product = services
        .store()
        .update_product(id, update)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::product_to_json(&product)).into_response())
}

/// DELETE /api/products/:id
///
/// Soft delete: the product keeps its history and stops being listed.
pub async fn deactivate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: ProductId = common::parse_id(&id, "product")?;
    let product = services
        .store()
        .deactivate_product(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::product_to_json(&product)).into_response())
}

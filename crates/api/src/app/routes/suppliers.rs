use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use pansoft_core::SupplierId;
use pansoft_parties::{NewSupplier, SupplierUpdate};

use crate::app::dto;
use crate::app::errors::store_error_to_response;
use crate::app::routes::common::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route(
            "/:id",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
}

pub async fn list_suppliers(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let suppliers = services
        .store()
        .list_suppliers()
        .await
        .map_err(store_error_to_response)?;
    let data: Vec<_> = suppliers.iter().map(dto::supplier_to_json).collect();
    Ok(Json(data).into_response())
}

pub async fn create_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::SupplierRequest>, JsonRejection>,
) -> ApiResult {
    let body = common::body(body)?;
    let contact = body.contact();
    let input = NewSupplier {
        // A missing name fails validation like a blank one.
        name: body.name.unwrap_or_default(),
        contact_name: body.contact_name,
        contact,
    };

    let supplier = services
        .store()
        .create_supplier(input)
        .await
        .map_err(store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(dto::supplier_to_json(&supplier))).into_response())
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: SupplierId = common::parse_id(&id, "supplier")?;
    let supplier = services
        .store()
        .get_supplier(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::supplier_to_json(&supplier)).into_response())
}

pub async fn update_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::SupplierRequest>, JsonRejection>,
) -> ApiResult {
    let id: SupplierId = common::parse_id(&id, "supplier")?;
    let body = common::body(body)?;
    let contact = body.contact();
    let update = SupplierUpdate {
        name: body.name,
        contact_name: body.contact_name,
        contact,
        active: body.active,
    };

    let supplier = services
        .store()
        .update_supplier(id, update)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::supplier_to_json(&supplier)).into_response())
}

/// DELETE /api/suppliers/:id
///
/// Hard delete; supplies that referenced the supplier are detached.
pub async fn delete_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: SupplierId = common::parse_id(&id, "supplier")?;
    services
        .store()
        .delete_supplier(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

//! Raw-material catalog and stock.

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

use pansoft_core::SupplyId;
use pansoft_infra::{CatalogFilter, MovementQuery};
use pansoft_inventory::{StockSubject, SubjectKind};
use pansoft_products::{NewSupply, SupplyUpdate};

use crate::app::dto;
use crate::app::errors::store_error_to_response;
use crate::app::routes::common::{self, ApiResult};
use crate::app::routes::inventory::movement_history;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_supplies).post(create_supply))
        .route("/history/all/movements", get(supply_history))
        .route(
            "/:id",
            get(get_supply)
                .put(record_supply_movement)
                .patch(update_supply)
                .delete(deactivate_supply),
        )
        .route("/:id/movements", get(supply_movements))
}

pub async fn list_supplies(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::CatalogQuery>, QueryRejection>,
) -> ApiResult {
    let query = common::query(query)?;
    let supplies = services
        .store()
        .list_supplies(CatalogFilter {
            include_inactive: query.include_inactive,
            low_stock_only: query.low_stock,
        })
        .await
        .map_err(store_error_to_response)?;
    let data: Vec<_> = supplies.iter().map(dto::supply_to_json).collect();
    Ok(Json(data).into_response())
}

pub async fn create_supply(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateSupplyRequest>, JsonRejection>,
) -> ApiResult {
    let body = common::body(body)?;
    let input = NewSupply {
        name: body.name,
        unit: body.unit,
        cost_per_unit: body.cost_per_unit,
        initial_quantity: body.quantity,
        min_stock: body.min_stock,
        supplier_id: body.supplier_id,
    };

    let (supply, movement) = services
        .store()
        .create_supply(input, body.user_id)
        .await
        .map_err(store_error_to_response)?;
    if let Some(m) = &movement {
        services.publish_movements(std::slice::from_ref(m));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "supply": dto::supply_to_json(&supply),
            "movement": movement.as_ref().map(dto::movement_to_json),
        })),
    )
        .into_response())
}

pub async fn get_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: SupplyId = common::parse_id(&id, "supply")?;
    let supply = services
        .store()
        .get_supply(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::supply_to_json(&supply)).into_response())
}

pub async fn update_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateSupplyRequest>, JsonRejection>,
) -> ApiResult {
    let id: SupplyId = common::parse_id(&id, "supply")?;
    let body = common::body(body)?;
    let update = SupplyUpdate {
        name: body.name,
        unit: body.unit,
        cost_per_unit: body.cost_per_unit,
        min_stock: body.min_stock,
        supplier_id: body.supplier_id,
        clear_supplier: body.clear_supplier,
        active: body.active,
    };

    let supply = services
        .store()
        .update_supply(id, update)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::supply_to_json(&supply)).into_response())
}

pub async fn deactivate_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: SupplyId = common::parse_id(&id, "supply")?;
    let supply = services
        .store()
        .deactivate_supply(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::supply_to_json(&supply)).into_response())
}

/// PUT /api/supplies/:id
///
/// Records one movement against the supply.
pub async fn record_supply_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::RecordMovementRequest>, JsonRejection>,
) -> ApiResult {
    let id: SupplyId = common::parse_id(&id, "supply")?;
    let body = common::body(body)?;

    let movements = services
        .store()
        .record_movements(vec![body.into_command(StockSubject::Supply(id))])
        .await
        .map_err(store_error_to_response)?;
    services.publish_movements(&movements);

    let mut supply = services
        .store()
        .get_supply(id)
        .await
        .map_err(store_error_to_response)?;
    let movement = movements.first();
    // Another write may land before the re-read; report this movement's result.
    if let Some(m) = movement {
        supply.quantity = m.new_quantity;
    }
    Ok(Json(json!({
        "supply": dto::supply_to_json(&supply),
        "movement": movement.map(dto::movement_to_json),
    }))
    .into_response())
}

pub async fn supply_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    query: Result<Query<dto::HistoryQuery>, QueryRejection>,
) -> ApiResult {
    let id: SupplyId = common::parse_id(&id, "supply")?;
    let query = common::query(query)?;
    services
        .store()
        .get_supply(id)
        .await
        .map_err(store_error_to_response)?;
    movement_history(
        &services,
        MovementQuery::for_subject(StockSubject::Supply(id)),
        query,
    )
    .await
}

pub async fn supply_history(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::HistoryQuery>, QueryRejection>,
) -> ApiResult {
    let query = common::query(query)?;
    movement_history(&services, MovementQuery::for_kind(SubjectKind::Supply), query).await
}

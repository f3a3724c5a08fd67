use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use pansoft_core::EmployeeId;
use pansoft_parties::{EmployeeUpdate, NewEmployee};

use crate::app::dto;
use crate::app::errors::{self, store_error_to_response};
use crate::app::routes::common::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_employees).post(create_employee))
        .route(
            "/:id",
            get(get_employee)
                .put(update_employee)
                .delete(deactivate_employee),
        )
}

pub async fn list_employees(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::CatalogQuery>, QueryRejection>,
) -> ApiResult {
    let query = common::query(query)?;
    let employees = services
        .store()
        .list_employees(query.include_inactive)
        .await
        .map_err(store_error_to_response)?;
    let data: Vec<_> = employees.iter().map(dto::employee_to_json).collect();
    Ok(Json(data).into_response())
}

pub async fn create_employee(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::EmployeeRequest>, JsonRejection>,
) -> ApiResult {
    let body = common::body(body)?;
    let contact = body.contact();
    let Some(role) = body.role else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "role is required",
        ));
    };
    let input = NewEmployee {
        full_name: body.full_name.unwrap_or_default(),
        role,
        contact,
        hire_date: body.hire_date,
    };

    let employee = services
        .store()
        .create_employee(input)
        .await
        .map_err(store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(dto::employee_to_json(&employee))).into_response())
}

pub async fn get_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: EmployeeId = common::parse_id(&id, "employee")?;
    let employee = services
        .store()
        .get_employee(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::employee_to_json(&employee)).into_response())
}

pub async fn update_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::EmployeeRequest>, JsonRejection>,
) -> ApiResult {
    let id: EmployeeId = common::parse_id(&id, "employee")?;
    let body = common::body(body)?;
    let contact = body.contact();
    let update = EmployeeUpdate {
        full_name: body.full_name,
        role: body.role,
        contact,
        hire_date: body.hire_date,
        active: body.active,
    };

    let employee = services
        .store()
        .update_employee(id, update)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::employee_to_json(&employee)).into_response())
}

/// DELETE /api/employees/:id
///
/// Employees are referenced by movements, so they are only deactivated.
pub async fn deactivate_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: EmployeeId = common::parse_id(&id, "employee")?;
    let employee = services
        .store()
        .deactivate_employee(id)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(dto::employee_to_json(&employee)).into_response())
}

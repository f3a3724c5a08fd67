//! Ledger maintenance endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::QueryRejection,
    extract::{Extension, Query},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use pansoft_infra::{audit_ledger, repair_ledger};
use pansoft_inventory::SubjectKind;

use crate::app::dto;
use crate::app::errors::{domain_error_to_response, store_error_to_response};
use crate::app::routes::common::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/ledger/audit", get(audit))
        .route("/ledger/repair", post(repair))
}

/// `?kind=` defaults to products.
fn subject_kind(query: dto::LedgerKindQuery) -> Result<SubjectKind, axum::response::Response> {
    match query.kind.as_deref() {
        None => Ok(SubjectKind::Product),
        Some(raw) => raw.parse().map_err(domain_error_to_response),
    }
}

pub async fn audit(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::LedgerKindQuery>, QueryRejection>,
) -> ApiResult {
    let kind = subject_kind(common::query(query)?)?;
    let audits = audit_ledger(services.store(), kind)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(json!({ "kind": kind, "subjects": audits })).into_response())
}

pub async fn repair(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::LedgerKindQuery>, QueryRejection>,
) -> ApiResult {
    let kind = subject_kind(common::query(query)?)?;
    let report = repair_ledger(services.store(), kind, Utc::now())
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(report).into_response())
}

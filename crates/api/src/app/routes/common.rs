use core::str::FromStr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::response::Response;

use crate::app::errors;

/// Handlers answer with a response either way; `Err` carries the error body.
pub type ApiResult = Result<Response, Response>;

/// Unwrap a JSON body, answering 400 on malformed input.
pub fn body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(b)| b).map_err(errors::json_rejection)
}

/// Unwrap query parameters, answering 400 on malformed input.
pub fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    query.map(|Query(q)| q).map_err(errors::query_rejection)
}

/// Parse a path id, answering 400 when it is not a valid id.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.parse::<T>().map_err(|_| errors::invalid_id(what))
}

//! HTTP handlers translating Vault-style calls into backend requests.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};

use super::{error::ApiError, routes::ApiState};
use crate::backend::{self, role_store::parse_duration, LeaseMetadata, Operation, Request};
use crate::errors::Error;

type ApiResult = Result<Response, ApiError>;

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
    if !value.is_object() {
        return Err(ApiError::bad_request("Request body must be a JSON object"));
    }
    Ok(value)
}

/// Decode a body into `T`, reporting every failure as a bad request.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_value(parse_body(body)?)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

fn into_http(response: backend::Response) -> Response {
    if response.data.is_none() && response.secret.is_none() {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(response).into_response()
}

async fn dispatch(state: &ApiState, operation: Operation, path: String, data: Value) -> ApiResult {
    let ctx = state.request_context();
    let request = Request::new(operation, path).with_data(data);
    let response = state.backend.handle_request(&ctx, request).await?;
    Ok(into_http(response))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

pub async fn help_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({ "help": state.backend.help() }))
}

pub async fn read_config_handler(State(state): State<ApiState>) -> ApiResult {
    dispatch(&state, Operation::Read, "config".to_string(), Value::Null).await
}

pub async fn write_config_handler(State(state): State<ApiState>, body: Bytes) -> ApiResult {
    let data = parse_body(&body)?;
    dispatch(&state, Operation::Update, "config".to_string(), data).await
}

pub async fn delete_config_handler(State(state): State<ApiState>) -> ApiResult {
    dispatch(&state, Operation::Delete, "config".to_string(), Value::Null).await
}

pub async fn list_roles_handler(State(state): State<ApiState>) -> ApiResult {
    dispatch(&state, Operation::List, "roles/".to_string(), Value::Null).await
}

pub async fn read_role_handler(State(state): State<ApiState>, Path(name): Path<String>) -> ApiResult {
    dispatch(&state, Operation::Read, format!("roles/{}", name), Value::Null).await
}

pub async fn write_role_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let data = parse_body(&body)?;
    dispatch(&state, Operation::Update, format!("roles/{}", name), data).await
}

pub async fn delete_role_handler(State(state): State<ApiState>, Path(name): Path<String>) -> ApiResult {
    dispatch(&state, Operation::Delete, format!("roles/{}", name), Value::Null).await
}

#[derive(Debug, Deserialize)]
pub struct CredsQuery {
    pub ttl: Option<String>,
}

pub async fn read_creds_handler(
    State(state): State<ApiState>,
    Path(role): Path<String>,
    Query(query): Query<CredsQuery>,
) -> ApiResult {
    let data = match query.ttl {
        Some(ttl) => json!({ "ttl": ttl }),
        None => Value::Null,
    };
    dispatch(&state, Operation::Read, format!("creds/{}", role), data).await
}

pub async fn issue_creds_handler(
    State(state): State<ApiState>,
    Path(role): Path<String>,
    body: Bytes,
) -> ApiResult {
    let data = parse_body(&body)?;
    dispatch(&state, Operation::Update, format!("creds/{}", role), data).await
}

#[derive(Debug, Deserialize)]
pub struct RenewBody {
    pub lease: LeaseMetadata,
    #[serde(default)]
    pub increment: Option<Value>,
}

pub async fn renew_lease_handler(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult {
    let body: RenewBody = parse_json(&body)?;
    let increment = match body.increment {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            parse_duration(&value)
                .map_err(|e| Error::invalid_request(format!("increment: {}", e)))?,
        ),
    };

    let ctx = state.request_context();
    let lease = state.backend.renew_secret(&ctx, &body.lease, increment).await?;
    Ok(Json(json!({ "lease": lease })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RevokeBody {
    pub lease: LeaseMetadata,
}

pub async fn revoke_lease_handler(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult {
    let body: RevokeBody = parse_json(&body)?;
    let ctx = state.request_context();
    state.backend.revoke_secret(&ctx, &body.lease).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
pub struct InvalidateBody {
    pub key: String,
}

pub async fn invalidate_handler(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult {
    let body: InvalidateBody = parse_json(&body)?;
    state.backend.invalidate(&body.key).await;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/**
 * HTTP API - Thin axum surface over `HostService`
 *
 * ROLE:
 * Decodes requests, resolves the owner, calls the service and wraps the
 * result in the `{code, message, data}` envelope.
 *
 * SECURITY:
 * - `x-api-key` header required on every route except /health
 * - `x-fleet-user` header names the owner; token issuance is external
 */

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::error::{FleetError, ResultCode};
use crate::lifecycle::HostUpdate;
use crate::models::{HostCandidate, HostId};
use crate::query::{GroupQuery, HostQuery};
use crate::service::{HostInfoQuery, HostService};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const USER_HEADER: &str = "x-fleet-user";

#[derive(Clone)]
pub struct AppState {
    pub service: HostService,
    pub api_key: Arc<str>,
}

/// Response envelope shared by every route.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: ResultCode,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

fn status_for(code: ResultCode) -> StatusCode {
    match code {
        ResultCode::Succeeded | ResultCode::PartialSucceeded => StatusCode::OK,
        ResultCode::ParamError => StatusCode::BAD_REQUEST,
        ResultCode::DataExists => StatusCode::CONFLICT,
        ResultCode::NoData => StatusCode::NOT_FOUND,
        ResultCode::TokenError => StatusCode::UNAUTHORIZED,
        ResultCode::StoreConnectError | ResultCode::StoreWriteError => StatusCode::INTERNAL_SERVER_ERROR,
        ResultCode::ConnectivityError | ResultCode::AuthError | ResultCode::ExecuteCommandError => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn reply(code: ResultCode, message: impl Into<String>, data: Value) -> Response {
    let body = Envelope { code, message: message.into(), data };
    (status_for(code), Json(body)).into_response()
}

fn ok<T: Serialize>(code: ResultCode, data: &T) -> Response {
    match serde_json::to_value(data) {
        Ok(data) => reply(code, code.label(), data),
        Err(e) => reply(ResultCode::ParamError, e.to_string(), Value::Null),
    }
}

fn failed(err: FleetError) -> Response {
    reply(err.code(), err.to_string(), Value::Null)
}

fn respond<T: Serialize>(result: Result<T, FleetError>) -> Response {
    match result {
        Ok(data) => ok(ResultCode::Succeeded, &data),
        Err(e) => failed(e),
    }
}

async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path();

    // /health stays open
    if path.starts_with("/health") {
        return next.run(req).await;
    }

    if state.api_key.is_empty() {
        warn!("FLEET_API_KEY not set, API access denied");
        return reply(ResultCode::TokenError, ResultCode::TokenError.label(), Value::Null);
    }

    let ok = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == &*state.api_key)
        .unwrap_or(false);

    if !ok {
        return reply(ResultCode::TokenError, ResultCode::TokenError.label(), Value::Null);
    }
    next.run(req).await
}

/// Owner of the request, taken from `x-fleet-user`.
fn owner(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| reply(ResultCode::TokenError, "missing user", Value::Null))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/manage/host/add", post(add_host))
        .route("/manage/host/add/batch", post(add_host_batch))
        .route("/manage/host/update", post(update_host))
        .route("/manage/host/delete", delete(delete_hosts))
        .route("/manage/host/get", post(list_hosts))
        .route("/manage/host/count", post(host_count))
        .route("/manage/host/info/query", post(host_info))
        .route("/manage/host/group/add", post(add_group))
        .route("/manage/host/group/delete", delete(delete_groups))
        .route("/manage/host/group/get", post(list_groups))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct BatchBody {
    host_list: Vec<HostCandidate>,
}

#[derive(Debug, Deserialize)]
struct HostIdsBody {
    host_list: Vec<HostId>,
}

#[derive(Debug, Deserialize)]
struct GroupBody {
    host_group_name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct GroupNamesBody {
    host_group_list: Vec<String>,
}

// POST /manage/host/add
async fn add_host(State(app): State<AppState>, headers: HeaderMap, Json(body): Json<HostCandidate>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    respond(app.service.add_host(&owner, body).await)
}

// POST /manage/host/add/batch
async fn add_host_batch(State(app): State<AppState>, headers: HeaderMap, Json(body): Json<BatchBody>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    let report = app.service.add_host_batch(&owner, body.host_list).await;
    let code = report.code;
    match serde_json::to_value(&report.results) {
        Ok(results) => reply(code, code.label(), results),
        Err(e) => reply(ResultCode::ParamError, e.to_string(), Value::Null),
    }
}

// POST /manage/host/update
async fn update_host(State(app): State<AppState>, headers: HeaderMap, Json(body): Json<HostUpdate>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    respond(app.service.update_host(&owner, body).await)
}

// DELETE /manage/host/delete
async fn delete_hosts(State(app): State<AppState>, headers: HeaderMap, Json(body): Json<HostIdsBody>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    match app.service.delete_hosts(&owner, &body.host_list).await {
        Ok(report) => ok(report.code, &report),
        Err(e) => failed(e),
    }
}

// POST /manage/host/get
async fn list_hosts(State(app): State<AppState>, headers: HeaderMap, Json(query): Json<HostQuery>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    respond(app.service.list_hosts(&owner, &query).await)
}

// POST /manage/host/count
async fn host_count(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    respond(app.service.host_count(&owner).await.map(|count| json!({ "host_count": count })))
}

// POST /manage/host/info/query
async fn host_info(State(app): State<AppState>, headers: HeaderMap, Json(query): Json<HostInfoQuery>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    respond(app.service.get_host_info(&owner, &query).await)
}

// POST /manage/host/group/add
async fn add_group(State(app): State<AppState>, headers: HeaderMap, Json(body): Json<GroupBody>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    respond(
        app.service
            .add_host_group(&owner, &body.host_group_name, &body.description)
            .await
            .map(|id| json!({ "host_group_id": id })),
    )
}

// DELETE /manage/host/group/delete
async fn delete_groups(State(app): State<AppState>, headers: HeaderMap, Json(body): Json<GroupNamesBody>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    match app.service.delete_host_groups(&owner, &body.host_group_list).await {
        Ok(report) => ok(report.code, &report),
        Err(e) => failed(e),
    }
}

// POST /manage/host/group/get
async fn list_groups(State(app): State<AppState>, headers: HeaderMap, Json(query): Json<GroupQuery>) -> Response {
    let owner = match owner(&headers) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    respond(app.service.list_host_groups(&owner, &query).await)
}

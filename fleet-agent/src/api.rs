//! HTTP endpoint queried by the kernel.
//!
//! `POST /v1/agent/host/info` with `{"info_type": [...]}` answers
//! `{"status": "succeeded", "host_info": {...}}`.

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::metrics::{collect_host_info, InfoCategory};

pub const HOST_INFO_PATH: &str = "/v1/agent/host/info";

#[derive(Debug, Default, Deserialize)]
pub struct HostInfoRequest {
    #[serde(default)]
    pub info_type: Vec<InfoCategory>,
}

#[derive(Debug, Serialize)]
pub struct HostInfoResponse {
    pub status: &'static str,
    pub host_info: Map<String, Value>,
}

pub fn build_router() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(HOST_INFO_PATH, post(host_info))
}

async fn host_info(Json(request): Json<HostInfoRequest>) -> Json<HostInfoResponse> {
    let host_info = collect_host_info(&request.info_type).await;
    info!("served host info ({} categories)", host_info.len());
    Json(HostInfoResponse { status: "succeeded", host_info })
}

//! Health and version endpoints
//!
//! - /health, /healthz - liveness check, 200 while the process serves
//! - /version          - build metadata captured by build.rs

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::config::KvBackend;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub timestamp: String,
    /// "development" or "production"
    pub mode: &'static str,
    pub node_id: String,
    pub kv_backend: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub git_commit_full: &'static str,
    pub build_timestamp: &'static str,
}

/// GET /health, /healthz
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let args = &state.args;
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: state.clock.now().to_rfc3339(),
        mode: if args.dev_mode { "development" } else { "production" },
        node_id: args.node_id.to_string(),
        kv_backend: match args.kv_backend {
            KvBackend::Memory => "memory",
            KvBackend::Mongodb => "mongodb",
        },
    };
    json_response(StatusCode::OK, &response)
}

/// GET /version
pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: env!("GIT_COMMIT_SHORT"),
            git_commit_full: env!("GIT_COMMIT_FULL"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
        },
    )
}

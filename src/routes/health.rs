//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - liveness (is the gateway running?)
//! - /ready, /readyz - readiness (can the gateway reach the registry?)
//!
//! Liveness always answers 200 while the process is up. Readiness answers
//! 200 only when the worker registry responds to a ping, since a gateway
//! without its registry can neither dispatch nor report pressure.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::http::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    healthy: bool,
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    timestamp: String,
    node_id: String,
    namespace: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionResponse {
    version: &'static str,
    git_commit: &'static str,
    built_at: &'static str,
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        node_id: state.args.node_id.to_string(),
        namespace: state.args.kube_namespace.clone(),
    };

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"healthy":true}"#.to_string());

    json_response(StatusCode::OK, body)
}

/// Handle readiness probe (/ready, /readyz)
pub async fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.registry.ping().await {
        Ok(()) => json_response(StatusCode::OK, r#"{"ready": true}"#.to_string()),
        Err(e) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(r#"{{"ready": false, "error": "{e}"}}"#),
        ),
    }
}

/// Version info for deployment verification (GET /version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        git_commit: env!("GIT_COMMIT_SHORT"),
        built_at: env!("BUILD_TIMESTAMP"),
    };

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"version":"unknown"}"#.to_string());

    json_response(StatusCode::OK, body)
}

//! Scheduled job listing.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;

use crate::server::http::AppState;

/// GET /schedules - the statically declared job table with run telemetry.
pub async fn list_schedules(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let jobs = state.scheduler.jobs().await;

    let body = serde_json::to_string(&jobs).unwrap_or_else(|_| "[]".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

//! Cluster pressure endpoint.
//!
//! Aggregates the registry's current record set into a `ClusterSnapshot`.
//! The same payload shape is what each worker serves at its own `/pressure`
//! endpoint for the prober to poll.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::error;

use crate::pressure::ClusterSnapshot;
use crate::server::http::AppState;

/// GET /pressure
pub async fn cluster_pressure(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let records = match state.registry.list().await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "pressure snapshot failed, registry unreachable");
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(
                    r#"{"error": "Worker registry unreachable"}"#,
                )))
                .unwrap();
        }
    };

    let snapshot = ClusterSnapshot::from_records(records);
    let body = serde_json::to_string(&snapshot)
        .unwrap_or_else(|_| r#"{"error": "Serialization failed"}"#.to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

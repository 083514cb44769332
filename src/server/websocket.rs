//! Upgrade handshake handling for the streaming endpoint.
//!
//! Per incoming upgrade request: authorize the token, sanitize the query
//! string, dispatch a worker, dial its streaming endpoint and hand the
//! connection pair to the tunnel. Any failure before the handoff is written
//! onto the client connection as a structured rejection.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::SanitizedQuery;
use crate::proxy;
use crate::server::http::AppState;
use crate::server::reject;
use crate::types::{GatewayError, Result};

/// Handle a client upgrade request on any path.
pub async fn handle_upgrade(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let connection_id = Uuid::new_v4();

    match run_handshake(state, req, connection_id).await {
        Ok(response) => response,
        Err(err) => reject::rejection_response(&connection_id.to_string(), &err),
    }
}

async fn run_handshake(
    state: Arc<AppState>,
    mut req: Request<Incoming>,
    connection_id: Uuid,
) -> Result<Response<Full<Bytes>>> {
    let path = req.uri().path().to_string();

    let sanitized = SanitizedQuery::from_query(
        req.uri().query(),
        state.args.token.as_deref(),
        &state.args.user_data_root,
    )?;

    let worker = state.dispatcher.dispatch().await?;

    info!(
        connection_id = %connection_id,
        worker = %worker.address,
        running = worker.running,
        queued = worker.queued,
        "worker dispatched"
    );

    // Dial the worker before answering the client: a failed dial must still
    // surface as a rejection on the not-yet-upgraded connection.
    let worker_ws = proxy::connect_worker(
        &worker.address,
        state.args.worker_port,
        &path,
        sanitized.forwarded(),
    )
    .await?;

    let (response, websocket) = hyper_tungstenite::upgrade(&mut req, None)
        .map_err(|e| GatewayError::Proxy(format!("client upgrade failed: {e}")))?;

    tokio::spawn(proxy::run_tunnel(
        websocket,
        worker_ws,
        connection_id,
        worker.address.clone(),
    ));

    // Hand hyper the 101 so the upgrade completes.
    let (parts, _) = response.into_parts();
    Ok(Response::from_parts(parts, Full::new(Bytes::new())))
}

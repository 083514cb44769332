//! HTTP server implementation
//!
//! Hyper http1 with TokioIo and upgrade support. Upgrade requests on any
//! path go to the gateway handshake; everything else is routed on
//! `(Method, path)`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Args;
use crate::dispatch::Dispatcher;
use crate::registry::WorkerRegistry;
use crate::routes;
use crate::schedule::Scheduler;
use crate::server::websocket;
use crate::types::{GatewayError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub registry: Arc<WorkerRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub scheduler: Arc<Scheduler>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        registry: Arc<WorkerRegistry>,
        dispatcher: Arc<Dispatcher>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            args,
            registry,
            dispatcher,
            scheduler,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(GatewayError::Io)?;

    info!(
        "hivegate listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    // Streaming clients upgrade on whatever path their SDK uses; the
    // handshake owns every upgrade request before conventional routing.
    if hyper_tungstenite::is_upgrade_request(&req) {
        return Ok(websocket::handle_upgrade(state, req).await);
    }

    let response = match (method, path.as_str()) {
        // Aggregated fleet pressure, also the payload shape workers expose
        (Method::GET, "/pressure") => routes::cluster_pressure(Arc::clone(&state)).await,

        // Liveness probe - returns 200 if the gateway is running
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe - returns 200 only if the registry answers
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state)).await
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // Scheduled job table
        (Method::GET, "/schedules") => routes::list_schedules(Arc::clone(&state)).await,

        // Per-user profile directory lifecycle
        (Method::GET, p) if p.starts_with("/userdata/") => {
            let id = p.strip_prefix("/userdata/").unwrap_or("");
            routes::get_user_data(&state.args.user_data_root, id).await
        }
        (Method::DELETE, p) if p.starts_with("/userdata/") => {
            let id = p.strip_prefix("/userdata/").unwrap_or("");
            routes::delete_user_data(&state.args.user_data_root, id).await
        }

        // Not found
        _ => not_found_response(&path),
    };

    Ok(response)
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
        "hint": "Open a WebSocket connection to attach to a browser worker"
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

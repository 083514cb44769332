//! WebSocket tunnel between a client connection and a browser worker.
//!
//! The gateway terminates the client's upgrade, dials the selected worker's
//! streaming endpoint with the sanitized query string and relays frames in
//! both directions until either side closes. Lifecycle events are logged
//! under the per-connection correlation id.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use hyper_tungstenite::HyperWebsocket;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::types::{GatewayError, Result};

pub type WorkerWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Streaming endpoint URL for a worker, preserving the client's path.
pub fn worker_endpoint(address: &str, port: u16, path: &str, query: &str) -> String {
    if query.is_empty() {
        format!("ws://{address}:{port}{path}")
    } else {
        format!("ws://{address}:{port}{path}?{query}")
    }
}

/// Dial the worker's streaming endpoint. Performed before the client's own
/// upgrade completes, so a dead worker still produces a pre-upgrade
/// rejection instead of a dropped 101.
pub async fn connect_worker(
    address: &str,
    port: u16,
    path: &str,
    query: &str,
) -> Result<WorkerWebSocket> {
    let endpoint = worker_endpoint(address, port, path, query);

    let request = Request::builder()
        .uri(&endpoint)
        .header("Host", format!("{address}:{port}"))
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .body(())
        .map_err(|e| GatewayError::Proxy(format!("handshake request build failed: {e}")))?;

    let (worker_ws, _) = connect_async_with_config(request, None, false)
        .await
        .map_err(|e| GatewayError::Proxy(format!("{address}:{port}: {e}")))?;

    debug!(worker = %address, endpoint = %endpoint, "worker tunnel established");
    Ok(worker_ws)
}

/// Relay frames between the upgraded client connection and the worker until
/// either side closes. Runs as its own task; all outcomes are logged, never
/// propagated, and the connection pair is torn down on the first error.
pub async fn run_tunnel(
    websocket: HyperWebsocket,
    worker_ws: WorkerWebSocket,
    connection_id: Uuid,
    worker_address: String,
) {
    let client_ws = match websocket.await {
        Ok(ws) => ws,
        Err(e) => {
            error!(connection_id = %connection_id, error = %e, "client upgrade failed");
            return;
        }
    };

    info!(
        connection_id = %connection_id,
        worker = %worker_address,
        "tunnel open"
    );

    let (client_sink, client_stream) = client_ws.split();
    let (worker_sink, worker_stream) = worker_ws.split();

    tokio::select! {
        _ = pump(client_stream, worker_sink, "client->worker", connection_id) => {}
        _ = pump(worker_stream, client_sink, "worker->client", connection_id) => {}
    }

    info!(
        connection_id = %connection_id,
        worker = %worker_address,
        "tunnel closed"
    );
}

/// Forward frames from one side to the other. Close frames are passed along
/// before ending the pump so the peer sees a clean shutdown.
async fn pump<S, K>(mut stream: S, mut sink: K, direction: &'static str, connection_id: Uuid)
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    K: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(frame)) => {
                debug!(connection_id = %connection_id, direction, "close frame");
                let _ = sink.send(Message::Close(frame)).await;
                break;
            }
            Ok(message) => {
                if let Err(e) = sink.send(message).await {
                    error!(
                        connection_id = %connection_id,
                        direction,
                        error = %e,
                        "tunnel send failed"
                    );
                    break;
                }
            }
            Err(e) => {
                error!(
                    connection_id = %connection_id,
                    direction,
                    error = %e,
                    "tunnel receive failed"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_without_query() {
        assert_eq!(
            worker_endpoint("10.0.0.4", 3000, "/", ""),
            "ws://10.0.0.4:3000/"
        );
    }

    #[test]
    fn endpoint_preserves_path_and_query() {
        assert_eq!(
            worker_endpoint("10.0.0.4", 3000, "/devtools/browser", "token=secret"),
            "ws://10.0.0.4:3000/devtools/browser?token=secret"
        );
    }
}

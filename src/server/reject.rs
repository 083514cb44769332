//! Structured rejection of handshake requests.
//!
//! Upgrade requests that fail before the proxy handoff are answered on the
//! not-yet-upgraded connection with a minimal plain-text response (status
//! line, a fixed header block, a machine-readable reject reason and the
//! message), then the connection is closed. This path is deliberately
//! separate from the JSON helpers used by conventional routes.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::warn;

use crate::types::GatewayError;

pub const REJECT_REASON_HEADER: &str = "X-WebSocket-Reject-Reason";

pub const REASON_BUSY: &str = "Browser worker busy!";
pub const REASON_INVALID_TOKEN: &str = "Invalid api token!";
pub const REASON_EMPTY_FLEET: &str = "Empty browser worker!";

/// Status line and reject reason for a handshake failure.
pub fn classify(err: &GatewayError) -> (StatusCode, String) {
    match err {
        GatewayError::Busy => (StatusCode::TOO_MANY_REQUESTS, REASON_BUSY.to_string()),
        GatewayError::Unauthorized => (StatusCode::FORBIDDEN, REASON_INVALID_TOKEN.to_string()),
        GatewayError::EmptyFleet => {
            (StatusCode::INTERNAL_SERVER_ERROR, REASON_EMPTY_FLEET.to_string())
        }
        other => (StatusCode::BAD_REQUEST, other.to_string()),
    }
}

/// Build the rejection written onto the client connection.
pub fn rejection_response(connection_id: &str, err: &GatewayError) -> Response<Full<Bytes>> {
    let (status, reason) = classify(err);

    warn!(
        connection_id = %connection_id,
        status = status.as_u16(),
        reason = %reason,
        "rejecting handshake"
    );

    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=UTF-8")
        .header("Content-Encoding", "UTF-8")
        .header("Accept-Ranges", "bytes")
        .header("Connection", "keep-alive")
        .header(REJECT_REASON_HEADER, reason.clone())
        .body(Full::new(Bytes::from(reason)))
        .unwrap_or_else(|_| {
            // Reaching this arm means the error message itself was not a
            // legal header value.
            let mut fallback = Response::new(Full::new(Bytes::from("Bad Request")));
            *fallback.status_mut() = StatusCode::BAD_REQUEST;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_429() {
        let (status, reason) = classify(&GatewayError::Busy);
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(reason, "Browser worker busy!");
    }

    #[test]
    fn bad_token_maps_to_403() {
        let (status, reason) = classify(&GatewayError::Unauthorized);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(reason, "Invalid api token!");
    }

    #[test]
    fn empty_fleet_maps_to_500() {
        let (status, reason) = classify(&GatewayError::EmptyFleet);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reason, "Empty browser worker!");
    }

    #[test]
    fn everything_else_maps_to_400_with_the_raw_message() {
        let (status, reason) =
            classify(&GatewayError::Validation("Invalid user data id".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reason, "Invalid user data id");
    }

    #[test]
    fn response_carries_the_reject_reason_header() {
        let response = rejection_response("conn-1", &GatewayError::Busy);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(REJECT_REASON_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("Browser worker busy!")
        );
        assert_eq!(
            response
                .headers()
                .get("Content-Type")
                .and_then(|v| v.to_str().ok()),
            Some("text/plain; charset=UTF-8")
        );
    }
}

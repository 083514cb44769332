//! Error types shared across the gateway.

use thiserror::Error;

/// Errors produced by gateway operations.
///
/// Background refresh errors (`Discovery`, `Probe`) are logged and isolated;
/// they never escape the scheduled job that produced them. Handshake errors
/// are always answered with a structured rejection on the client connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Control-plane communication failed; the refresh cycle is retried on
    /// the next cadence.
    #[error("fleet discovery failed: {0}")]
    Discovery(String),

    /// A single worker's pressure probe failed (timeout, non-2xx or
    /// malformed payload). Evicts that worker only.
    #[error("pressure probe failed: {0}")]
    Probe(String),

    /// The shared registry store is unreachable or misbehaving.
    #[error("worker registry error: {0}")]
    Registry(String),

    /// The registry holds no worker records at all.
    #[error("no browser workers registered")]
    EmptyFleet,

    /// Workers are registered but none currently accepts new sessions.
    #[error("all browser workers are busy")]
    Busy,

    /// The client token did not match the configured access token.
    #[error("invalid api token")]
    Unauthorized,

    /// A client-supplied parameter failed validation.
    #[error("{0}")]
    Validation(String),

    /// The tunnel to the selected worker could not be established.
    #[error("worker connection failed: {0}")]
    Proxy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_passes_through_verbatim() {
        let err = GatewayError::Validation("Invalid user data id".to_string());
        assert_eq!(err.to_string(), "Invalid user data id");
    }
}

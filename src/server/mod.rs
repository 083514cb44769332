//! HTTP/WebSocket server

pub mod http;
pub mod reject;
pub mod websocket;

pub use http::{run, AppState};

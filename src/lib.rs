//! hivegate - load-balancing gateway for headless browser workers
//!
//! hivegate fronts a horizontally-scaled fleet of stateless browser workers.
//! A scheduled refresh job discovers worker pods through the Kubernetes
//! control plane, probes their pressure endpoints with bounded concurrency
//! and mirrors the results into a shared TTL-bounded Redis registry. Client
//! streaming connections are authorized, sanitized and attached to the
//! least-loaded available worker; requests that cannot be placed are
//! answered with a structured rejection on the raw connection.
//!
//! ## Services
//!
//! - **Gateway**: WebSocket handshake, dispatch and worker tunneling
//! - **Registry**: shared pressure store, one logical fleet view across
//!   all gateway instances
//! - **Fleet refresh**: discovery + probing on a fixed, coalescing cadence
//! - **Pressure API**: aggregated cluster snapshot at `/pressure`
//! - **User data**: per-user browser profile directory lifecycle

pub mod auth;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod fleet;
pub mod pressure;
pub mod prober;
pub mod proxy;
pub mod registry;
pub mod routes;
pub mod schedule;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};

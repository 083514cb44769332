//! Configuration for hivegate
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// hivegate - load-balancing gateway for headless browser workers
///
/// Sits in front of a horizontally-scaled fleet of browser workers, keeps a
/// shared pressure registry fresh and attaches client streaming connections
/// to the least-loaded worker.
#[derive(Parser, Debug, Clone)]
#[command(name = "hivegate")]
#[command(about = "Load-balancing WebSocket gateway for headless browser workers")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Kubernetes namespace the worker fleet runs in
    #[arg(long, env = "KUBE_NAMESPACE", default_value = "default")]
    pub kube_namespace: String,

    /// Label selector identifying worker pods (e.g. "app=browser-worker")
    #[arg(long, env = "WORKER_SELECTOR", default_value = "app=browser-worker")]
    pub worker_selector: String,

    /// Port the workers expose their streaming endpoint on
    #[arg(long, env = "WORKER_PORT", default_value = "3000")]
    pub worker_port: u16,

    /// Port the workers expose /pressure on (defaults to the worker port)
    #[arg(long, env = "PROBE_PORT")]
    pub probe_port: Option<u16>,

    /// Shared access token. When set, clients must present it as a `token`
    /// query parameter; when unset, authentication is disabled.
    #[arg(long, env = "TOKEN")]
    pub token: Option<String>,

    /// Redis connection URL for the shared worker registry
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Key prefix for registry hashes; the namespace is appended
    #[arg(long, env = "REGISTRY_PREFIX", default_value = "hivegate:workers")]
    pub registry_prefix: String,

    /// TTL in seconds applied to the registry record collection on every write
    #[arg(long, env = "REGISTRY_TTL_SECS", default_value = "6")]
    pub registry_ttl_secs: u64,

    /// Maximum concurrent pressure probes per refresh pass
    #[arg(long, env = "PROBE_CONCURRENCY", default_value = "5")]
    pub probe_concurrency: usize,

    /// Per-probe request timeout in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "2000")]
    pub probe_timeout_ms: u64,

    /// Cadence of the fleet refresh job in seconds
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value = "3")]
    pub refresh_interval_secs: u64,

    /// Root directory holding per-user browser profile directories
    #[arg(long, env = "USER_DATA_ROOT", default_value = "/userdata")]
    pub user_data_root: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Effective pressure-probe port (falls back to the worker port).
    pub fn probe_port(&self) -> u16 {
        self.probe_port.unwrap_or(self.worker_port)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.probe_concurrency == 0 || self.probe_concurrency > 10 {
            return Err("PROBE_CONCURRENCY must be between 1 and 10".to_string());
        }

        if self.probe_timeout_ms >= self.refresh_interval_secs * 1000 {
            return Err("PROBE_TIMEOUT_MS must be shorter than the refresh interval".to_string());
        }

        if self.registry_ttl_secs < self.refresh_interval_secs {
            return Err(
                "REGISTRY_TTL_SECS must be at least the refresh interval, or records expire between refreshes"
                    .to_string(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["hivegate"])
    }

    #[test]
    fn defaults_validate() {
        assert!(base_args().validate().is_ok());
    }

    #[test]
    fn probe_port_falls_back_to_worker_port() {
        let mut args = base_args();
        args.worker_port = 3100;
        args.probe_port = None;
        assert_eq!(args.probe_port(), 3100);

        args.probe_port = Some(9222);
        assert_eq!(args.probe_port(), 9222);
    }

    #[test]
    fn rejects_excessive_probe_concurrency() {
        let mut args = base_args();
        args.probe_concurrency = 50;
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_probe_timeout_longer_than_cadence() {
        let mut args = base_args();
        args.probe_timeout_ms = 5000;
        args.refresh_interval_secs = 3;
        assert!(args.validate().is_err());
    }
}

//! Concurrent pressure probing of worker pods.
//!
//! Each refresh pass fans out over the discovered addresses with bounded
//! concurrency, writes successful probes into the registry and evicts
//! workers that fail to answer. One worker's failure never aborts the batch.

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::pressure::{PressureBody, PressureRecord};
use crate::registry::WorkerRegistry;
use crate::types::{GatewayError, Result};

pub struct PressureProber {
    http: Client,
    registry: Arc<WorkerRegistry>,
    probe_port: u16,
    token: Option<String>,
    concurrency: usize,
}

impl PressureProber {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        probe_port: u16,
        token: Option<String>,
        concurrency: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Probe(format!("http client init failed: {e}")))?;

        Ok(Self {
            http,
            registry,
            probe_port,
            token,
            concurrency,
        })
    }

    /// Fetch and normalize one worker's pressure payload.
    pub async fn probe(&self, address: &str) -> Result<PressureRecord> {
        let url = self.probe_url(address);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Probe(format!("{address}: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Probe(format!(
                "{address}: unexpected status {}",
                response.status()
            )));
        }

        let body: PressureBody = response
            .json()
            .await
            .map_err(|e| GatewayError::Probe(format!("{address}: malformed payload: {e}")))?;

        Ok(body.pressure.into_record(address))
    }

    /// Probe every address with bounded fan-out, reflecting each outcome in
    /// the registry as it lands.
    pub async fn refresh_all(&self, addresses: &[String]) {
        stream::iter(addresses.iter().cloned())
            .for_each_concurrent(self.concurrency, |address| async move {
                match self.probe(&address).await {
                    Ok(record) => {
                        if let Err(e) = self.registry.upsert(&record).await {
                            warn!(worker = %address, error = %e, "registry write failed");
                        } else {
                            debug!(
                                worker = %address,
                                running = record.running,
                                available = record.is_available,
                                "pressure refreshed"
                            );
                        }
                    }
                    Err(e) => {
                        warn!(worker = %address, error = %e, "probe failed, evicting worker");
                        self.registry.remove(&address).await;
                    }
                }
            })
            .await;
    }

    fn probe_url(&self, address: &str) -> String {
        probe_url(address, self.probe_port, self.token.as_deref())
    }
}

fn probe_url(address: &str, port: u16, token: Option<&str>) -> String {
    match token {
        Some(token) => format!("http://{address}:{port}/pressure?token={token}"),
        None => format!("http://{address}:{port}/pressure"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_url_without_token() {
        assert_eq!(
            probe_url("10.0.0.7", 3000, None),
            "http://10.0.0.7:3000/pressure"
        );
    }

    #[test]
    fn probe_url_with_token() {
        assert_eq!(
            probe_url("10.0.0.7", 9222, Some("secret")),
            "http://10.0.0.7:9222/pressure?token=secret"
        );
    }
}

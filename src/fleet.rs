//! The idempotent "refresh fleet" operation invoked on the schedule cadence.
//!
//! Discovery → registry reconciliation → bounded-concurrency probing. The
//! registry ends the pass holding exactly the discovered, answering workers.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::discovery::FleetDiscovery;
use crate::prober::PressureProber;
use crate::registry::WorkerRegistry;
use crate::types::Result;

pub struct FleetRefresher {
    discovery: FleetDiscovery,
    prober: PressureProber,
    registry: Arc<WorkerRegistry>,
}

impl FleetRefresher {
    pub fn new(
        discovery: FleetDiscovery,
        prober: PressureProber,
        registry: Arc<WorkerRegistry>,
    ) -> Self {
        Self {
            discovery,
            prober,
            registry,
        }
    }

    /// One refresh pass. A discovery failure aborts the pass (retried on the
    /// next cadence); individual probe failures are handled inside the
    /// prober and only evict their own worker.
    pub async fn refresh(&self) -> Result<()> {
        let addresses = self.discovery.list_workers().await?;

        self.reconcile(&addresses).await;
        self.prober.refresh_all(&addresses).await;

        info!(workers = addresses.len(), "fleet refresh complete");
        Ok(())
    }

    /// Drop registry records for addresses the control plane no longer
    /// lists. Registry read failures are ignored here; the subsequent
    /// probe pass will surface store trouble on its own writes.
    async fn reconcile(&self, discovered: &[String]) {
        let known: HashSet<&str> = discovered.iter().map(String::as_str).collect();

        let records = match self.registry.list().await {
            Ok(records) => records,
            Err(e) => {
                debug!(error = %e, "skipping reconciliation, registry unreadable");
                return;
            }
        };

        for record in records {
            if !known.contains(record.address.as_str()) {
                info!(worker = %record.address, "worker left the fleet, removing record");
                self.registry.remove(&record.address).await;
            }
        }
    }
}

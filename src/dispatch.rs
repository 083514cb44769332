//! Worker selection for incoming streaming connections.
//!
//! Dispatch trusts the registry's cached view and never performs network
//! health checks of its own: selection is O(known workers) and non-blocking
//! on worker liveness. Routing to a worker that died since the last probe is
//! tolerated: the 3 s probe cadence corrects the view, and a genuinely full
//! worker rejects on its own.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::pressure::PressureRecord;
use crate::registry::WorkerRegistry;
use crate::types::{GatewayError, Result};

pub struct Dispatcher {
    registry: Arc<WorkerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Pick the least-loaded available worker and speculatively bump its
    /// `running` count in the registry.
    ///
    /// The returned record is the pre-increment snapshot: the increment is
    /// bookkeeping for subsequent dispatch decisions, not a reservation. An
    /// increment failure (record evicted mid-flight, store hiccup) is logged
    /// and the selection stands; the next probe cycle self-corrects.
    pub async fn dispatch(&self) -> Result<PressureRecord> {
        let records = self.registry.list().await?;
        let selected = select_worker(&records)?.clone();

        match self.registry.increment_running(&selected.address).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    worker = %selected.address,
                    "record vanished before running increment, proceeding anyway"
                );
            }
            Err(e) => {
                warn!(worker = %selected.address, error = %e, "running increment failed");
            }
        }

        Ok(selected)
    }
}

/// Rank records by load ratio ascending (stable sort, so ties keep registry
/// enumeration order) and take the first available one.
pub fn select_worker(records: &[PressureRecord]) -> Result<&PressureRecord> {
    if records.is_empty() {
        return Err(GatewayError::EmptyFleet);
    }

    let mut ranked: Vec<&PressureRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        a.load_ratio()
            .partial_cmp(&b.load_ratio())
            .unwrap_or(Ordering::Equal)
    });

    ranked
        .into_iter()
        .find(|record| record.is_available)
        .ok_or(GatewayError::Busy)
}

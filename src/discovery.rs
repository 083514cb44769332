//! Fleet discovery through the Kubernetes control plane.
//!
//! Lists worker pods by label selector and returns the addresses of the ones
//! in a running lifecycle state. Discovery failures are never fatal: the
//! caller treats them as a failed refresh cycle and retries on the next
//! cadence.

use k8s_openapi::api::core::v1::{Pod, PodStatus};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

use crate::types::{GatewayError, Result};

pub struct FleetDiscovery {
    pods: Api<Pod>,
    selector: String,
}

impl FleetDiscovery {
    /// Build a discovery client from the ambient cluster configuration
    /// (in-cluster service account or local kubeconfig).
    pub async fn new(namespace: &str, selector: &str) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| GatewayError::Discovery(format!("kube client init failed: {e}")))?;

        Ok(Self {
            pods: Api::namespaced(client, namespace),
            selector: selector.to_string(),
        })
    }

    /// Addresses of worker pods currently in the `Running` phase.
    pub async fn list_workers(&self) -> Result<Vec<String>> {
        let params = ListParams::default().labels(&self.selector);
        let pod_list = self
            .pods
            .list(&params)
            .await
            .map_err(|e| GatewayError::Discovery(format!("pod listing failed: {e}")))?;

        let addresses: Vec<String> = pod_list
            .items
            .into_iter()
            .filter(|pod| is_running(&pod.status))
            .filter_map(|pod| pod.status.and_then(|status| status.pod_ip))
            .collect();

        debug!(
            selector = %self.selector,
            count = addresses.len(),
            "discovered running workers"
        );

        Ok(addresses)
    }
}

fn is_running(status: &Option<PodStatus>) -> bool {
    status
        .as_ref()
        .and_then(|s| s.phase.as_ref())
        .map(|phase| phase == "Running")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(phase: Option<&str>) -> Option<PodStatus> {
        Some(PodStatus {
            phase: phase.map(String::from),
            ..Default::default()
        })
    }

    #[test]
    fn running_phase_is_accepted() {
        assert!(is_running(&status(Some("Running"))));
    }

    #[test]
    fn pending_and_terminating_phases_are_skipped() {
        assert!(!is_running(&status(Some("Pending"))));
        assert!(!is_running(&status(Some("Succeeded"))));
        assert!(!is_running(&status(None)));
        assert!(!is_running(&None));
    }
}

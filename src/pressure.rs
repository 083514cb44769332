//! Worker pressure records and cluster-wide aggregation.
//!
//! A `PressureRecord` is the normalized health/load snapshot for one worker,
//! written into the shared registry by the prober and read back by dispatch
//! and the `/pressure` endpoint. `ClusterSnapshot` is derived on demand and
//! never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized pressure snapshot for a single worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureRecord {
    /// Worker network address (pod IP), unique key in the registry.
    pub address: String,
    /// When this record was produced.
    pub observed_at: DateTime<Utc>,
    /// Whether the worker currently accepts new sessions.
    pub is_available: bool,
    /// Sessions currently running. May transiently exceed `max_concurrent`
    /// between poll cycles; that bound is a soft target.
    pub running: u32,
    /// Sessions waiting in the worker's queue.
    pub queued: u32,
    /// Sessions the worker rejected in its recent accounting window.
    pub recently_rejected: u32,
    /// Concurrent session capacity.
    pub max_concurrent: u32,
    /// Queue capacity.
    pub max_queued: u32,
    /// CPU usage percent; `None` means unknown and is excluded from means.
    pub cpu: Option<f64>,
    /// Memory usage percent.
    pub memory: f64,
}

impl PressureRecord {
    /// Load ratio used for dispatch ranking: queued work over total capacity.
    pub fn load_ratio(&self) -> f64 {
        let capacity = self.max_concurrent + self.max_queued;
        if capacity == 0 {
            return f64::INFINITY;
        }
        f64::from(self.running + self.queued) / f64::from(capacity)
    }

    /// Concurrency utilization percent, floored to two decimals.
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent == 0 {
            return 0.0;
        }
        let pct = f64::from(self.running) * 100.0 / f64::from(self.max_concurrent);
        (pct * 100.0).floor() / 100.0
    }
}

/// The `pressure` sub-object each worker serves at its own `/pressure`
/// endpoint. `reason`/`message` advisory fields are not modeled and are
/// dropped during deserialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPressure {
    pub is_available: bool,
    pub running: u32,
    pub queued: u32,
    #[serde(default)]
    pub recently_rejected: u32,
    pub max_concurrent: u32,
    #[serde(default)]
    pub max_queued: u32,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: f64,
}

impl WorkerPressure {
    /// Attach the probed address and an observation timestamp.
    pub fn into_record(self, address: &str) -> PressureRecord {
        PressureRecord {
            address: address.to_string(),
            observed_at: Utc::now(),
            is_available: self.is_available,
            running: self.running,
            queued: self.queued,
            recently_rejected: self.recently_rejected,
            max_concurrent: self.max_concurrent,
            max_queued: self.max_queued,
            cpu: self.cpu,
            memory: self.memory,
        }
    }
}

/// Wire envelope of the worker pressure endpoint: `{ "pressure": { ... } }`.
#[derive(Debug, Deserialize)]
pub struct PressureBody {
    pub pressure: WorkerPressure,
}

/// Per-worker utilization entry inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerUtilization {
    pub address: String,
    pub percent: f64,
}

/// Min/mean/max concurrency utilization across the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub per_worker: Vec<WorkerUtilization>,
}

/// Aggregated cluster view served at `GET /pressure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    /// Snapshot time in epoch milliseconds.
    pub date: i64,
    pub running: u32,
    pub queued: u32,
    pub recently_rejected: u32,
    pub is_available: bool,
    pub max_concurrent: u32,
    pub max_queued: u32,
    /// Mean CPU percent over workers that reported one; null when none did.
    pub cpu: Option<f64>,
    /// Mean memory percent.
    pub memory: f64,
    pub utilization: UtilizationSummary,
    pub worker_pressures: Vec<PressureRecord>,
}

impl ClusterSnapshot {
    /// Aggregate the current registry view into a snapshot.
    pub fn from_records(records: Vec<PressureRecord>) -> Self {
        let per_worker: Vec<WorkerUtilization> = records
            .iter()
            .map(|r| WorkerUtilization {
                address: r.address.clone(),
                percent: r.utilization(),
            })
            .collect();

        let utilization = summarize_utilization(&per_worker);

        let cpu_samples: Vec<f64> = records.iter().filter_map(|r| r.cpu).collect();
        let cpu = mean(&cpu_samples);

        let memory_samples: Vec<f64> = records.iter().map(|r| r.memory).collect();
        let memory = mean(&memory_samples).unwrap_or(0.0);

        ClusterSnapshot {
            date: Utc::now().timestamp_millis(),
            running: records.iter().map(|r| r.running).sum(),
            queued: records.iter().map(|r| r.queued).sum(),
            recently_rejected: records.iter().map(|r| r.recently_rejected).sum(),
            is_available: records.iter().any(|r| r.is_available),
            max_concurrent: records.iter().map(|r| r.max_concurrent).sum(),
            max_queued: records.iter().map(|r| r.max_queued).sum(),
            cpu,
            memory,
            utilization,
            worker_pressures: records,
        }
    }
}

fn summarize_utilization(per_worker: &[WorkerUtilization]) -> UtilizationSummary {
    let percents: Vec<f64> = per_worker.iter().map(|u| u.percent).collect();
    let min = percents.iter().copied().fold(f64::INFINITY, f64::min);
    let max = percents.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    UtilizationSummary {
        min: if min.is_finite() { min } else { 0.0 },
        mean: mean(&percents).unwrap_or(0.0),
        max: if max.is_finite() { max } else { 0.0 },
        per_worker: per_worker.to_vec(),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, running: u32, max_concurrent: u32) -> PressureRecord {
        PressureRecord {
            address: address.to_string(),
            observed_at: Utc::now(),
            is_available: true,
            running,
            queued: 0,
            recently_rejected: 0,
            max_concurrent,
            max_queued: 10,
            cpu: Some(40.0),
            memory: 50.0,
        }
    }

    #[test]
    fn utilization_floors_to_two_decimals() {
        // 1/3 of 100 = 33.333... -> 33.33
        let r = record("10.0.0.1", 1, 3);
        assert_eq!(r.utilization(), 33.33);
    }

    #[test]
    fn snapshot_sums_and_utilization_bounds() {
        let a = record("10.0.0.1", 1, 5); // 20.00
        let b = record("10.0.0.2", 3, 4); // 75.00
        let snapshot = ClusterSnapshot::from_records(vec![a, b]);

        assert_eq!(snapshot.running, 4);
        assert_eq!(snapshot.max_concurrent, 9);
        assert!(snapshot.is_available);

        assert_eq!(snapshot.utilization.min, 20.0);
        assert_eq!(snapshot.utilization.max, 75.0);
        assert_eq!(snapshot.utilization.mean, 47.5);
        assert_eq!(snapshot.utilization.per_worker.len(), 2);
        assert_eq!(snapshot.utilization.per_worker[0].percent, 20.0);
        assert_eq!(snapshot.utilization.per_worker[1].percent, 75.0);
    }

    #[test]
    fn cpu_mean_skips_unknown_samples() {
        let mut a = record("10.0.0.1", 0, 5);
        a.cpu = Some(30.0);
        let mut b = record("10.0.0.2", 0, 5);
        b.cpu = None;
        let mut c = record("10.0.0.3", 0, 5);
        c.cpu = Some(50.0);

        let snapshot = ClusterSnapshot::from_records(vec![a, b, c]);
        assert_eq!(snapshot.cpu, Some(40.0));
    }

    #[test]
    fn cpu_is_null_when_no_worker_reports_it() {
        let mut a = record("10.0.0.1", 0, 5);
        a.cpu = None;
        let snapshot = ClusterSnapshot::from_records(vec![a]);
        assert_eq!(snapshot.cpu, None);
    }

    #[test]
    fn empty_snapshot_is_unavailable() {
        let snapshot = ClusterSnapshot::from_records(vec![]);
        assert!(!snapshot.is_available);
        assert_eq!(snapshot.running, 0);
        assert_eq!(snapshot.cpu, None);
        assert_eq!(snapshot.utilization.min, 0.0);
        assert_eq!(snapshot.utilization.max, 0.0);
    }

    #[test]
    fn load_ratio_counts_queue_against_total_capacity() {
        let mut r = record("10.0.0.1", 2, 5);
        r.queued = 3;
        r.max_queued = 5;
        assert_eq!(r.load_ratio(), 0.5);
    }

    #[test]
    fn worker_payload_discards_advisory_fields() {
        let raw = r#"{
            "pressure": {
                "date": 1700000000000,
                "isAvailable": true,
                "queued": 2,
                "recentlyRejected": 1,
                "running": 4,
                "maxConcurrent": 10,
                "maxQueued": 10,
                "cpu": 38.5,
                "memory": 61.2,
                "reason": "full",
                "message": "too many sessions"
            }
        }"#;

        let body: PressureBody = serde_json::from_str(raw).expect("payload parses");
        let record = body.pressure.into_record("10.1.2.3");
        assert_eq!(record.address, "10.1.2.3");
        assert_eq!(record.running, 4);
        assert_eq!(record.queued, 2);
        assert_eq!(record.cpu, Some(38.5));
        assert!(record.is_available);
    }

    #[test]
    fn worker_payload_tolerates_missing_cpu() {
        let raw = r#"{"pressure": {"isAvailable": false, "running": 0, "queued": 0, "maxConcurrent": 5}}"#;
        let body: PressureBody = serde_json::from_str(raw).expect("payload parses");
        assert_eq!(body.pressure.cpu, None);
        assert_eq!(body.pressure.max_queued, 0);
    }
}

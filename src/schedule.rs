//! Interval job scheduling.
//!
//! Jobs are declared in an explicit table built at initialization, with no
//! runtime discovery. Each job runs on its own `tokio::time::interval` with
//! an in-flight guard: ticks that land while a run is still active are
//! coalesced (skipped, not queued), so at most one execution of a job is
//! ever in flight. Handler errors are logged and never break the schedule.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

pub type JobHandler = Arc<dyn Fn() -> BoxFuture<'static, crate::types::Result<()>> + Send + Sync>;

/// One entry of the job table.
pub struct ScheduledJob {
    name: &'static str,
    interval: Duration,
    handler: JobHandler,
    in_flight: AtomicBool,
    last_started_at: RwLock<Option<DateTime<Utc>>>,
}

/// Job description served at `GET /schedules`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub interval_ms: u64,
    pub last_started_at: Option<DateTime<Utc>>,
    pub next_date: Option<DateTime<Utc>>,
}

impl ScheduledJob {
    fn new(name: &'static str, interval: Duration, handler: JobHandler) -> Self {
        Self {
            name,
            interval,
            handler,
            in_flight: AtomicBool::new(false),
            last_started_at: RwLock::new(None),
        }
    }

    /// Run the handler unless a previous run is still active. Returns
    /// whether the run actually happened.
    pub async fn run_guarded(&self) -> bool {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!(job = self.name, "previous run still active, tick coalesced");
            return false;
        }

        *self.last_started_at.write().await = Some(Utc::now());

        if let Err(e) = (self.handler)().await {
            error!(job = self.name, error = %e, "scheduled job failed");
        }

        self.in_flight.store(false, Ordering::SeqCst);
        true
    }

    async fn info(&self) -> JobInfo {
        let last_started_at = *self.last_started_at.read().await;
        JobInfo {
            kind: "interval",
            name: self.name,
            interval_ms: self.interval.as_millis() as u64,
            last_started_at,
            next_date: last_started_at.map(|at| {
                at + chrono::Duration::from_std(self.interval)
                    .unwrap_or_else(|_| chrono::Duration::zero())
            }),
        }
    }
}

/// Statically declared table of recurring jobs.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Arc<ScheduledJob>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, interval: Duration, handler: JobHandler) {
        self.jobs.push(Arc::new(ScheduledJob::new(name, interval, handler)));
    }

    /// Spawn one ticker task per registered job.
    pub fn start(&self) {
        for job in &self.jobs {
            let job = Arc::clone(job);
            info!(job = job.name, interval = ?job.interval, "starting scheduled job");

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(job.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;
                    job.run_guarded().await;
                }
            });
        }
    }

    /// Snapshot of the job table for the listing endpoint.
    pub async fn jobs(&self) -> Vec<JobInfo> {
        let mut infos = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            infos.push(job.info().await);
        }
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(
        runs: Arc<AtomicUsize>,
        hold: Arc<tokio::sync::Semaphore>,
    ) -> Arc<ScheduledJob> {
        let handler: JobHandler = Arc::new(move || {
            let runs = Arc::clone(&runs);
            let hold = Arc::clone(&hold);
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                let _permit = hold.acquire().await.expect("semaphore open");
                Ok(())
            })
        });
        Arc::new(ScheduledJob::new("test-job", Duration::from_millis(10), handler))
    }

    #[tokio::test]
    async fn concurrent_ticks_are_coalesced() {
        let runs = Arc::new(AtomicUsize::new(0));
        // Zero permits: the first run blocks inside the handler until we
        // add a permit, keeping the job in flight.
        let hold = Arc::new(tokio::sync::Semaphore::new(0));
        let job = counting_job(Arc::clone(&runs), Arc::clone(&hold));

        let running = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.run_guarded().await })
        };

        // Wait for the first run to enter the handler.
        while runs.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // A tick landing mid-run is skipped.
        assert!(!job.run_guarded().await);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        hold.add_permits(1);
        assert!(running.await.expect("task joins"));

        // After the run finishes the next tick executes again.
        hold.add_permits(1);
        assert!(job.run_guarded().await);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_handler_releases_the_guard() {
        let handler: JobHandler = Arc::new(|| {
            Box::pin(async { Err(crate::types::GatewayError::Discovery("down".into())) })
        });
        let job = ScheduledJob::new("failing-job", Duration::from_secs(1), handler);

        assert!(job.run_guarded().await);
        assert!(job.run_guarded().await);
    }

    #[tokio::test]
    async fn job_table_lists_registered_jobs() {
        let mut scheduler = Scheduler::new();
        scheduler.register(
            "refresh-worker-records",
            Duration::from_secs(3),
            Arc::new(|| Box::pin(async { Ok(()) })),
        );

        let jobs = scheduler.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "refresh-worker-records");
        assert_eq!(jobs[0].kind, "interval");
        assert_eq!(jobs[0].interval_ms, 3000);
        assert!(jobs[0].last_started_at.is_none());
    }
}

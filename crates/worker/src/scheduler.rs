//! Periodic enqueueing of the maintenance sweep.
//!
//! Every worker runs a scheduler, but only one enqueues per interval: the
//! slot is claimed with a conditional write in the shared key-value store
//! whose TTL equals the interval.

use std::sync::Arc;
use std::time::Duration;

use clipflow_core::error::CoreError;
use clipflow_core::lock::ExpiringKvStore;
use clipflow_core::queue::{JobHandle, JobQueue, PipelineJob};
use tokio_util::sync::CancellationToken;

const SCHEDULE_KEY: &str = "schedule:maintenance_sweep";

pub struct SweepScheduler {
    kv: Arc<dyn ExpiringKvStore>,
    queue: Arc<dyn JobQueue>,
    interval: Duration,
    owner: String,
}

impl SweepScheduler {
    pub fn new(
        kv: Arc<dyn ExpiringKvStore>,
        queue: Arc<dyn JobQueue>,
        interval: Duration,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            kv,
            queue,
            interval,
            owner: owner.into(),
        }
    }

    /// Enqueue a sweep if no worker has done so during the current interval.
    pub async fn tick(&self) -> Result<Option<JobHandle>, CoreError> {
        if !self.kv.set_if_absent(SCHEDULE_KEY, &self.owner, self.interval).await? {
            return Ok(None);
        }
        let job = self.queue.enqueue(&PipelineJob::MaintenanceSweep).await?;
        tracing::info!(job_id = job.id, worker = %self.owner, "Maintenance sweep scheduled");
        Ok(Some(job))
    }

    /// Check for a free slot every `poll` until cancelled.
    pub async fn run(&self, poll: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(poll);
        tracing::info!(interval_secs = self.interval.as_secs(), "Sweep scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sweep scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Sweep scheduling failed");
                    }
                }
            }
        }
    }
}

//! Job runner: claims queued jobs from Postgres and executes them.
//!
//! Claiming uses `SELECT ... FOR UPDATE SKIP LOCKED` via
//! [`JobRepo::claim_next`], so any number of worker processes can poll the
//! same table. A housekeeping loop returns jobs of crashed workers to the
//! queue once their visibility timeout elapses.

use std::sync::Arc;
use std::time::Duration;

use clipflow_core::queue::PipelineJob;
use clipflow_db::repositories::JobRepo;
use clipflow_db::{DbPool, PgKvStore};
use clipflow_pipeline::PipelineContext;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::WorkerConfig;

pub struct JobRunner {
    pool: DbPool,
    ctx: PipelineContext,
    config: Arc<WorkerConfig>,
}

impl JobRunner {
    pub fn new(pool: DbPool, ctx: PipelineContext, config: Arc<WorkerConfig>) -> Self {
        Self { pool, ctx, config }
    }

    /// Poll for jobs until cancelled, then wait for running jobs to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let tracker = TaskTracker::new();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            worker = %self.config.worker_name,
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Job runner started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job runner shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    while let Ok(permit) = Arc::clone(&permits).try_acquire_owned() {
                        let claimed = match JobRepo::claim_next(&self.pool, &self.config.worker_name).await {
                            Ok(claimed) => claimed,
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to claim job");
                                break;
                            }
                        };
                        let Some(job) = claimed else { break };

                        let pool = self.pool.clone();
                        let ctx = self.ctx.clone();
                        let timeout = self.config.job_timeout;
                        tracker.spawn(async move {
                            let _permit = permit;
                            tracing::info!(job_id = job.id, kind = %job.kind, attempt = job.attempts, "Job claimed");
                            let result = execute(&ctx, &job.payload, timeout).await;
                            record(&pool, job.id, result).await;
                        });
                    }
                }
            }
        }

        tracker.close();
        tracker.wait().await;
    }

    /// Requeue jobs of lost workers and purge expired key-value rows.
    pub async fn housekeeping(&self, kv: PgKvStore, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.housekeeping_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match JobRepo::requeue_stale(&self.pool, self.config.visibility_timeout).await {
                        Ok((0, 0)) => {}
                        Ok((requeued, failed)) => {
                            tracing::warn!(requeued, failed, "Recovered jobs from lost workers");
                        }
                        Err(e) => tracing::error!(error = %e, "Stale job recovery failed"),
                    }
                    match kv.purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => tracing::debug!(purged, "Expired key-value rows purged"),
                        Err(e) => tracing::error!(error = %e, "Key-value purge failed"),
                    }
                }
            }
        }
    }
}

/// Decode a job payload.
pub fn decode(payload: &serde_json::Value) -> Result<PipelineJob, String> {
    serde_json::from_value(payload.clone()).map_err(|e| format!("undecodable job payload: {e}"))
}

/// Execute one payload under a timeout. `Err` carries the failure message
/// recorded on the job.
pub async fn execute(
    ctx: &PipelineContext,
    payload: &serde_json::Value,
    timeout: Duration,
) -> Result<serde_json::Value, String> {
    let job = decode(payload)?;
    match tokio::time::timeout(timeout, ctx.execute(&job)).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("{} timed out after {}s", job.name(), timeout.as_secs())),
    }
}

async fn record(pool: &DbPool, job_id: i64, result: Result<serde_json::Value, String>) {
    let recorded = match &result {
        Ok(value) => JobRepo::complete(pool, job_id, value).await,
        Err(message) => {
            tracing::error!(job_id, error = %message, "Job failed");
            JobRepo::fail(pool, job_id, message).await
        }
    };
    match recorded {
        Ok(true) => tracing::info!(job_id, success = result.is_ok(), "Job finished"),
        // Requeued by housekeeping while running; the next attempt will
        // find the records already updated.
        Ok(false) => tracing::warn!(job_id, "Job was no longer running when it finished"),
        Err(e) => tracing::error!(job_id, error = %e, "Failed to record job result"),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn decodes_tagged_payloads() {
        let payload = serde_json::json!({"kind": "ingest_video", "args": {"video_id": 12}});
        assert_eq!(decode(&payload).unwrap(), PipelineJob::IngestVideo { video_id: 12 });

        let sweep = serde_json::json!({"kind": "maintenance_sweep"});
        assert_eq!(decode(&sweep).unwrap(), PipelineJob::MaintenanceSweep);
    }

    #[test]
    fn rejects_unknown_kinds() {
        let payload = serde_json::json!({"kind": "transcode_everything"});
        assert_matches!(decode(&payload), Err(msg) if msg.contains("undecodable"));
    }
}

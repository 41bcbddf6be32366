//! Periodic maintenance: anomalous lock cleanup, orphaned `in_progress`
//! repair and a health snapshot of the record and lock stores.
//!
//! The three checks are independent. A check that errors or panics is
//! reported in the [`SweepReport`] and the remaining checks still run.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use clipflow_core::error::CoreError;
use clipflow_core::types::Timestamp;
use clipflow_core::video::VideoStore;
use futures::FutureExt;
use serde::Serialize;

use crate::lock_service::LockService;
use crate::workflow::VideoWorkflow;

/// Result of one independent check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckResult {
    Ok { count: usize },
    Failed { error: String },
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub record_store: ComponentHealth,
    pub lock_store: ComponentHealth,
}

impl HealthSnapshot {
    pub fn healthy(&self) -> bool {
        self.record_store.healthy && self.lock_store.healthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub anomalous_locks_removed: CheckResult,
    pub orphans_repaired: CheckResult,
    pub health: HealthSnapshot,
}

pub struct MaintenanceSweep {
    videos: Arc<dyn VideoStore>,
    locks: LockService,
    workflow: VideoWorkflow,
}

impl MaintenanceSweep {
    pub fn new(videos: Arc<dyn VideoStore>, locks: LockService, workflow: VideoWorkflow) -> Self {
        Self {
            videos,
            locks,
            workflow,
        }
    }

    pub async fn run(&self) -> SweepReport {
        let started_at = Utc::now();

        let anomalous_locks_removed = guarded("lock sweep", self.locks.sweep_expired()).await;
        let orphans_repaired = guarded("orphan repair", self.workflow.repair_orphans()).await;
        let health = self.health().await;

        let report = SweepReport {
            started_at,
            finished_at: Utc::now(),
            anomalous_locks_removed,
            orphans_repaired,
            health,
        };
        if report.health.healthy() {
            tracing::info!(
                locks = ?report.anomalous_locks_removed,
                orphans = ?report.orphans_repaired,
                "Maintenance sweep finished"
            );
        } else {
            tracing::warn!(health = ?report.health, "Maintenance sweep found unhealthy components");
        }
        report
    }

    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            record_store: probe(self.videos.ping()).await,
            lock_store: probe(self.locks.ping()).await,
        }
    }
}

async fn guarded(name: &str, check: impl Future<Output = Result<usize, CoreError>>) -> CheckResult {
    match AssertUnwindSafe(check).catch_unwind().await {
        Ok(Ok(count)) => CheckResult::Ok { count },
        Ok(Err(e)) => {
            tracing::error!(check = name, error = %e, "Maintenance check failed");
            CheckResult::Failed {
                error: e.to_string(),
            }
        }
        Err(_) => {
            tracing::error!(check = name, "Maintenance check panicked");
            CheckResult::Failed {
                error: format!("{name} panicked"),
            }
        }
    }
}

async fn probe(ping: impl Future<Output = Result<(), CoreError>>) -> ComponentHealth {
    let start = Instant::now();
    let result = AssertUnwindSafe(ping).catch_unwind().await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(Ok(())) => ComponentHealth {
            healthy: true,
            latency_ms,
            error: None,
        },
        Ok(Err(e)) => ComponentHealth {
            healthy: false,
            latency_ms,
            error: Some(e.to_string()),
        },
        Err(_) => ComponentHealth {
            healthy: false,
            latency_ms,
            error: Some("health probe panicked".to_string()),
        },
    }
}

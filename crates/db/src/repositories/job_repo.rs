//! Repository for the `jobs` table.
//!
//! Uses `JobStatus` from `models::status` for every status transition.

use std::time::Duration;

use clipflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::Job;
use crate::models::status::JobStatus;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, kind, payload, status_id, attempts, max_attempts, worker_name, \
    claimed_at, completed_at, result, error_message, created_at, updated_at";

/// Provides queue operations for background jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new pending job.
    pub async fn enqueue(
        pool: &PgPool,
        kind: &str,
        payload: &serde_json::Value,
        max_attempts: i32,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (kind, payload, status_id, max_attempts) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(kind)
            .bind(payload)
            .bind(JobStatus::Pending.id())
            .bind(max_attempts)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the oldest pending job for a worker.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// claim the same row.
    pub async fn claim_next(pool: &PgPool, worker_name: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET worker_name = $1, claimed_at = NOW(), status_id = $2, \
                 attempts = attempts + 1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status_id = $3 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(worker_name)
            .bind(JobStatus::Running.id())
            .bind(JobStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Mark a running job as completed with its result payload.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, result = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.id())
        .bind(result)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Mark a running job as failed. Job bodies handle their own domain
    /// failures; this records crashes and timeouts.
    pub async fn fail(pool: &PgPool, job_id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Return jobs claimed longer than `visibility_timeout` ago to pending,
    /// or fail them once they exhausted `max_attempts`.
    ///
    /// Returns `(requeued, failed)`.
    pub async fn requeue_stale(
        pool: &PgPool,
        visibility_timeout: Duration,
    ) -> Result<(u64, u64), sqlx::Error> {
        let mut tx = pool.begin().await?;
        let secs = visibility_timeout.as_secs_f64();

        let failed = sqlx::query(
            "UPDATE jobs \
             SET status_id = $1, error_message = 'worker lost: attempts exhausted', \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE status_id = $2 \
               AND claimed_at < NOW() - make_interval(secs => $3) \
               AND attempts >= max_attempts",
        )
        .bind(JobStatus::Failed.id())
        .bind(JobStatus::Running.id())
        .bind(secs)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let requeued = sqlx::query(
            "UPDATE jobs \
             SET status_id = $1, worker_name = NULL, claimed_at = NULL, updated_at = NOW() \
             WHERE status_id = $2 \
               AND claimed_at < NOW() - make_interval(secs => $3) \
               AND attempts < max_attempts",
        )
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Running.id())
        .bind(secs)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok((requeued, failed))
    }
}

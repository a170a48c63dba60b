use std::time::Duration;

use sqlx::PgPool;
use tokio::time::sleep;
use uuid::Uuid;

use crate::db::queries;
use crate::models::job::{JobStatus, Pipeline};
use crate::services::queue::{Task, TaskQueue};

const BACKOFF_BASE_MS: u64 = 100;
// Caps the delay at 6.4s regardless of how many retries are configured.
const MAX_BACKOFF_SHIFT: u32 = 6;

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(MAX_BACKOFF_SHIFT)))
}

/// Turn "a job row was created" into "exactly one processing task exists".
///
/// Safe to invoke more than once for the same job: anything past pending
/// means a task already exists (or the job already finished) and the call
/// is a no-op. The status only moves to enqueued after the enqueue
/// succeeded, so a lost task can never leave a job silently pending.
pub async fn dispatch(
    pool: &PgPool,
    queue: &TaskQueue,
    job_id: Uuid,
    pipeline: Pipeline,
    max_retries: u32,
) -> Result<(), DispatchError> {
    let job = queries::get_job(pool, job_id)
        .await?
        .ok_or(DispatchError::JobNotFound(job_id))?;

    if job.status != JobStatus::Pending {
        tracing::info!(
            job_id = %job_id,
            status = %job.status,
            "Job already dispatched, ignoring duplicate notification"
        );
        return Ok(());
    }

    let task = Task {
        job_id,
        pipeline,
        attempt: 0,
    };

    let mut last_error = None;
    for attempt in 0..max_retries {
        match queue.enqueue(&task).await {
            Ok(()) => {
                let advanced =
                    queries::transition_status(pool, job_id, JobStatus::Pending, JobStatus::Enqueued)
                        .await?;
                if advanced {
                    tracing::info!(job_id = %job_id, pipeline = %pipeline, "Task enqueued");
                } else {
                    // A concurrent notification raced past the pending check
                    // and enqueued first; take back our copy so exactly one
                    // task exists for the job.
                    if let Err(e) = queue.discard(&task).await {
                        tracing::warn!(
                            job_id = %job_id,
                            error = %e,
                            "Could not discard duplicate task"
                        );
                    }
                    tracing::info!(
                        job_id = %job_id,
                        "Concurrent dispatch won the status race, duplicate task discarded"
                    );
                }
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    attempt = attempt + 1,
                    error = %e,
                    "Enqueue failed, backing off"
                );
                sleep(backoff_delay(attempt)).await;
                last_error = Some(e);
            }
        }
    }

    let detail = match last_error {
        Some(e) => format!("Dispatch failed after {max_retries} enqueue attempts: {e}"),
        None => "Dispatch failed: no enqueue attempts configured".to_string(),
    };
    queries::mark_failed(pool, job_id, &detail).await?;
    Err(DispatchError::Exhausted { job_id, detail })
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Could not enqueue task for job {job_id}: {detail}")]
    Exhausted { job_id: Uuid, detail: String },
}

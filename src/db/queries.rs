use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{Job, JobStatus, Pipeline};

const JOB_COLUMNS: &str = "id, pipeline, status, payload, artifact_prefix, result, error, \
                           attempt_count, created_at, updated_at, completed_at";

fn job_from_row(row: &PgRow) -> Result<Job, sqlx::Error> {
    let pipeline_str: String = row.try_get("pipeline")?;
    let status_str: String = row.try_get("status")?;

    let pipeline = Pipeline::from_str(&pipeline_str)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Job {
        id: row.try_get("id")?,
        pipeline,
        status,
        payload: row.try_get("payload")?,
        artifact_prefix: row.try_get("artifact_prefix")?,
        result: row.try_get("result")?,
        error: row.try_get("error")?,
        attempt_count: row.try_get("attempt_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Insert a new job in pending status. The id is generated by the caller
/// because the artifact prefix embeds it before the row exists.
pub async fn create_job(
    pool: &PgPool,
    job_id: Uuid,
    pipeline: Pipeline,
    payload: serde_json::Value,
    artifact_prefix: Option<&str>,
) -> Result<Job, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO jobs (id, pipeline, status, payload, artifact_prefix)
        VALUES ($1, $2, 'pending', $3, $4)
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(job_id)
    .bind(pipeline.to_string())
    .bind(payload)
    .bind(artifact_prefix)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE id = $1
        "#,
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Conditionally advance a job's status. Returns false when the job was not
/// in the expected prior status, which is how duplicate dispatches and
/// redelivered tasks detect each other. Statuses never move backwards.
pub async fn transition_status(
    pool: &PgPool,
    job_id: Uuid,
    from: JobStatus,
    to: JobStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1, updated_at = NOW()
        WHERE id = $2 AND status = $3
        "#,
    )
    .bind(to.to_string())
    .bind(job_id)
    .bind(from.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Persist the result and mark the job complete, only if it is still
/// processing. Returns false on a lost race (another delivery finished first).
pub async fn mark_complete(
    pool: &PgPool,
    job_id: Uuid,
    result: serde_json::Value,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'complete', result = $1, updated_at = NOW(), completed_at = NOW()
        WHERE id = $2 AND status = 'processing'
        "#,
    )
    .bind(result)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() == 1)
}

/// Mark the job failed with a structured error, from any non-terminal status.
pub async fn mark_failed(pool: &PgPool, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed', error = $1, updated_at = NOW(), completed_at = NOW()
        WHERE id = $2 AND status NOT IN ('complete', 'failed')
        "#,
    )
    .bind(error)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() == 1)
}

/// Increment processing attempt count
pub async fn increment_attempt_count(pool: &PgPool, job_id: Uuid) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE jobs
        SET attempt_count = attempt_count + 1, updated_at = NOW()
        WHERE id = $1
        RETURNING attempt_count
        "#,
    )
    .bind(job_id)
    .fetch_one(pool)
    .await?;

    row.try_get("attempt_count")
}

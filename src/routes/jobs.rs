use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::api::{JobStatusResponse, SubmitResponse};
use crate::models::job::{JobStatus, Pipeline};
use crate::models::review::ReviewData;
use crate::services::dispatcher;

fn artifact_prefix(job_id: Uuid) -> String {
    format!("jobs/{job_id}")
}

fn content_type_for(data: &[u8]) -> Result<&'static str, StatusCode> {
    match image::guess_format(data).map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)? {
        image::ImageFormat::Png => Ok("image/png"),
        image::ImageFormat::Jpeg => Ok("image/jpeg"),
        image::ImageFormat::WebP => Ok("image/webp"),
        _ => Err(StatusCode::UNSUPPORTED_MEDIA_TYPE),
    }
}

/// Create the job row and hand it to the dispatcher. The row exists before
/// the enqueue, so a dispatch failure always leaves a traceable failed job
/// rather than a silently missing one.
async fn create_and_dispatch(
    state: &AppState,
    job_id: Uuid,
    pipeline: Pipeline,
    payload: serde_json::Value,
    prefix: Option<&str>,
) -> Result<SubmitResponse, StatusCode> {
    queries::create_job(&state.db, job_id, pipeline, payload, prefix)
        .await
        .map_err(|e| {
            tracing::error!(job_id = %job_id, error = %e, "Failed to create job");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    metrics::counter!("analysis_jobs_total", "pipeline" => pipeline.to_string()).increment(1);

    let status = match dispatcher::dispatch(
        &state.db,
        &state.queue,
        job_id,
        pipeline,
        state.config.dispatch_max_retries,
    )
    .await
    {
        Ok(()) => JobStatus::Enqueued,
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Dispatch failed");
            JobStatus::Failed
        }
    };

    Ok(SubmitResponse { job_id, status })
}

/// POST /api/v1/jobs/activity — upload a capture session for analysis.
///
/// Multipart fields: repeated `screenshot` parts (filename carries the
/// capture number, e.g. 001.png), repeated `meta` parts (001_meta.txt),
/// optional `session_log`, optional `user_goals` JSON text.
pub async fn submit_activity(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let job_id = Uuid::new_v4();
    let prefix = artifact_prefix(job_id);

    let mut screenshots = 0usize;
    let mut user_goals: Option<serde_json::Value> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        match field.name() {
            Some("screenshot") => {
                let filename = field
                    .file_name()
                    .ok_or(StatusCode::BAD_REQUEST)?
                    .to_string();
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                let content_type = content_type_for(&data)?;
                state
                    .storage
                    .upload(&format!("{prefix}/{filename}"), &data, content_type)
                    .await
                    .map_err(|e| {
                        tracing::error!(job_id = %job_id, error = %e, "Screenshot upload failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    })?;
                screenshots += 1;
            }
            Some("meta") => {
                let filename = field
                    .file_name()
                    .ok_or(StatusCode::BAD_REQUEST)?
                    .to_string();
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                state
                    .storage
                    .upload(&format!("{prefix}/{filename}"), &data, "text/plain")
                    .await
                    .map_err(|e| {
                        tracing::error!(job_id = %job_id, error = %e, "Snapshot upload failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    })?;
            }
            Some("session_log") => {
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                state
                    .storage
                    .upload(&format!("{prefix}/session.log"), &data, "text/plain")
                    .await
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            }
            Some("user_goals") => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                user_goals =
                    Some(serde_json::from_str(&text).map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            _ => {}
        }
    }

    if screenshots == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let payload = serde_json::json!({ "user_goals": user_goals });
    let response = create_and_dispatch(
        &state,
        job_id,
        Pipeline::Activity,
        payload,
        Some(&prefix),
    )
    .await?;
    Ok(Json(response))
}

/// POST /api/v1/jobs/bookmark — upload a single screenshot to bookmark.
pub async fn submit_bookmark(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let job_id = Uuid::new_v4();
    let prefix = artifact_prefix(job_id);
    let mut have_screenshot = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        match field.name() {
            Some("screenshot") => {
                let filename = field.file_name().unwrap_or("screenshot.png").to_string();
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                let content_type = content_type_for(&data)?;
                state
                    .storage
                    .upload(&format!("{prefix}/{filename}"), &data, content_type)
                    .await
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
                have_screenshot = true;
            }
            Some("meta") => {
                let filename = field.file_name().unwrap_or("screenshot_meta.txt").to_string();
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                state
                    .storage
                    .upload(&format!("{prefix}/{filename}"), &data, "text/plain")
                    .await
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            }
            _ => {}
        }
    }

    if !have_screenshot {
        return Err(StatusCode::BAD_REQUEST);
    }

    let response = create_and_dispatch(
        &state,
        job_id,
        Pipeline::Bookmark,
        serde_json::json!({}),
        Some(&prefix),
    )
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ReviewSubmission {
    pub review_data: ReviewData,
}

/// POST /api/v1/jobs/review — submit aggregated weekly data for review.
/// The payload is inline; review jobs own no artifacts.
pub async fn submit_review(
    State(state): State<AppState>,
    Json(submission): Json<ReviewSubmission>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    submission
        .review_data
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    let job_id = Uuid::new_v4();
    let payload = serde_json::json!({ "review_data": submission.review_data });
    let response =
        create_and_dispatch(&state, job_id, Pipeline::Review, payload, None).await?;
    Ok(Json(response))
}

/// GET /api/v1/jobs/{job_id} — poll job status and result.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, StatusCode> {
    let job = queries::get_job(&state.db, job_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        pipeline: job.pipeline,
        status: job.status,
        result: job.result,
        error: job.error,
    }))
}

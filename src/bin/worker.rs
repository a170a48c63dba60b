use doit_analysis::{
    app_state::AppState,
    config::AppConfig,
    db::{self, queries},
    models::job::{Job, JobStatus},
    pipelines,
    services::{
        engine::GeminiClient,
        queue::{Task, TaskQueue},
        resolver::Resolver,
        storage::ArtifactStore,
    },
};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting analysis worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let storage = ArtifactStore::new(
        &config.artifact_bucket,
        &config.artifact_endpoint,
        &config.artifact_access_key,
        &config.artifact_secret_key,
    )
    .expect("Failed to initialize artifact store");

    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize task queue");

    let engine = GeminiClient::new(&config.gemini_api_key, &config.gemini_model);
    let resolver = Resolver::new(config.youtube_api_key.clone());

    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let state = AppState::new(db_pool, storage, queue, engine, resolver, config);

    // Tasks a crashed worker left on the processing list are redelivered
    // here; conditional status updates make a reclaimed live task a
    // harmless duplicate delivery.
    match state.queue.reclaim_in_flight().await {
        Ok(0) => {}
        Ok(reclaimed) => {
            tracing::info!(reclaimed, "Returned in-flight tasks to the queue");
        }
        Err(e) => tracing::warn!(error = %e, "In-flight task reclaim failed"),
    }

    tracing::info!("Worker ready, starting task processing loop");

    // Main processing loop
    loop {
        match process_next_task(&state).await {
            Ok(true) => {
                tracing::debug!("Task processed, checking for next task");
            }
            Ok(false) => {
                tracing::trace!("No tasks available, sleeping");
                sleep(poll_interval).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing task, will retry");
                sleep(poll_interval).await;
            }
        }
    }
}

/// Process the next task from the queue.
/// Returns Ok(true) if a task was consumed, Ok(false) if none was available.
async fn process_next_task(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let task = match state.queue.dequeue().await? {
        Some(t) => t,
        None => return Ok(false),
    };

    tracing::info!(
        job_id = %task.job_id,
        pipeline = %task.pipeline,
        attempt = task.attempt,
        "Processing task"
    );

    // An infra failure inside the handler must not strand the task on the
    // processing list with nothing left to redeliver it. Push it back
    // before surfacing the error; if that push fails too, the startup
    // reclaim sweep picks the task up.
    if let Err(e) = handle_task(state, &task).await {
        if let Err(requeue_err) = state.queue.requeue(&task).await {
            tracing::error!(
                job_id = %task.job_id,
                error = %requeue_err,
                "Could not requeue after handler error, task awaits reclaim"
            );
        }
        return Err(e);
    }
    Ok(true)
}

async fn handle_task(state: &AppState, task: &Task) -> Result<(), Box<dyn std::error::Error>> {
    // Claim the job. The pending arm covers a dispatcher that enqueued but
    // crashed before advancing the status; losing both conditional updates
    // means this is a redelivery: a terminal job only needs its cleanup
    // finished, a job stuck in processing belongs to a crashed attempt and
    // is taken over.
    let claimed = queries::transition_status(
        &state.db,
        task.job_id,
        JobStatus::Enqueued,
        JobStatus::Processing,
    )
    .await?
        || queries::transition_status(
            &state.db,
            task.job_id,
            JobStatus::Pending,
            JobStatus::Processing,
        )
        .await?;

    let job = match queries::get_job(&state.db, task.job_id).await? {
        Some(job) => job,
        None => {
            tracing::warn!(job_id = %task.job_id, "Task references unknown job, dropping");
            state.queue.complete(task).await?;
            return Ok(());
        }
    };

    if !claimed && job.status.is_terminal() {
        tracing::info!(
            job_id = %job.id,
            status = %job.status,
            "Duplicate delivery for finished job, finishing cleanup only"
        );
        release_artifacts(state, &job).await?;
        state.queue.complete(task).await?;
        return Ok(());
    }

    let attempts = queries::increment_attempt_count(&state.db, job.id).await?;

    match pipelines::process(state, &job).await {
        Ok(result) => {
            if !queries::mark_complete(&state.db, job.id, result).await? {
                tracing::warn!(job_id = %job.id, "Lost completion race, result not rewritten");
            }
            release_artifacts(state, &job).await?;
            state.queue.complete(task).await?;
            tracing::info!(job_id = %job.id, attempts, "Job completed");
            Ok(())
        }
        Err(e) if e.is_transient() && attempts < state.config.worker_max_attempts => {
            tracing::warn!(
                job_id = %job.id,
                attempts,
                error = %e,
                "Transient failure, requeueing for redelivery"
            );
            state.queue.requeue(task).await?;
            Ok(())
        }
        Err(e) => {
            let error = if e.is_transient() {
                format!("Dead-lettered after {attempts} attempts: {e}")
            } else {
                e.to_string()
            };
            tracing::error!(job_id = %job.id, attempts, error = %error, "Job failed permanently");

            queries::mark_failed(&state.db, job.id, &error).await?;
            release_artifacts(state, &job).await?;
            state.queue.complete(task).await?;
            Ok(())
        }
    }
}

/// Delete every artifact the job owns. Runs on every ack path, success or
/// permanent failure; a failed deletion leaves the task unacked so queue
/// redelivery retries it (delete-by-prefix is idempotent). Review jobs own
/// no artifacts and skip this.
async fn release_artifacts(state: &AppState, job: &Job) -> Result<(), Box<dyn std::error::Error>> {
    let Some(prefix) = job.artifact_prefix.as_deref() else {
        return Ok(());
    };
    let deleted = state.storage.delete_prefix(prefix).await?;
    if deleted > 0 {
        tracing::info!(job_id = %job.id, deleted, "Artifacts deleted");
    }
    Ok(())
}

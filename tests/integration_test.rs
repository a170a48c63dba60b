use doit_analysis::{
    app_state::AppState,
    config::AppConfig,
    db::{self, queries},
    models::job::{JobStatus, Pipeline},
    services::{
        dispatcher,
        engine::GeminiClient,
        queue::{Task, TaskQueue},
        resolver::Resolver,
        storage::ArtifactStore,
    },
};
use uuid::Uuid;

/// Integration test: dispatch and store plumbing.
///
/// Verifies against live backing services:
/// 1. Database connection, migrations and conditional job transitions
/// 2. Artifact store (upload/list/delete-prefix, idempotent cleanup)
/// 3. Task queue (enqueue/dequeue/ack/requeue)
/// 4. Dispatcher enqueue-once semantics under duplicate notifications
///
/// Note: this requires running PostgreSQL and Redis instances plus an
/// S3-compatible bucket, configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let storage = ArtifactStore::new(
        &config.artifact_bucket,
        &config.artifact_endpoint,
        &config.artifact_access_key,
        &config.artifact_secret_key,
    )
    .expect("Failed to initialize artifact store");

    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize queue");

    let engine = GeminiClient::new(&config.gemini_api_key, &config.gemini_model);
    let resolver = Resolver::new(config.youtube_api_key.clone());

    let state = AppState::new(db_pool.clone(), storage, queue, engine, resolver, config);

    // 1. Upload artifacts under a fresh job prefix
    let job_id = Uuid::new_v4();
    let prefix = format!("jobs/{job_id}");
    state
        .storage
        .upload(&format!("{prefix}/001.png"), b"fake screenshot", "image/png")
        .await
        .expect("Upload failed");
    state
        .storage
        .upload(
            &format!("{prefix}/001_meta.txt"),
            b"TXT: YouTube | ID: watch_title | CLS: TextView",
            "text/plain",
        )
        .await
        .expect("Upload failed");

    let keys = state.storage.list(&prefix).await.expect("List failed");
    assert_eq!(keys.len(), 2);

    // 2. Job creation and conditional transitions
    let job = queries::create_job(
        &db_pool,
        job_id,
        Pipeline::Activity,
        serde_json::json!({ "user_goals": null }),
        Some(&prefix),
    )
    .await
    .expect("Failed to create job");

    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt_count, 0);

    // 3. Dispatcher enqueues exactly once, even for duplicate notifications
    dispatcher::dispatch(&db_pool, &state.queue, job_id, Pipeline::Activity, 3)
        .await
        .expect("Dispatch failed");
    dispatcher::dispatch(&db_pool, &state.queue, job_id, Pipeline::Activity, 3)
        .await
        .expect("Duplicate dispatch should be a no-op");

    let job = queries::get_job(&db_pool, job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(job.status, JobStatus::Enqueued);

    let task = state
        .queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No task in queue");
    assert_eq!(task.job_id, job_id);
    assert!(
        state.queue.dequeue().await.expect("Dequeue failed").is_none(),
        "Duplicate notification must not enqueue a second task"
    );

    // 4. Claim is an at-most-once-effective compare-and-set
    assert!(
        queries::transition_status(&db_pool, job_id, JobStatus::Enqueued, JobStatus::Processing)
            .await
            .expect("Transition failed")
    );
    assert!(
        !queries::transition_status(&db_pool, job_id, JobStatus::Enqueued, JobStatus::Processing)
            .await
            .expect("Transition failed"),
        "Second claim must lose the compare-and-set"
    );

    // 5. Requeue bumps the attempt counter on the redelivered task
    state.queue.requeue(&task).await.expect("Requeue failed");
    let redelivered = state
        .queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("Requeued task missing");
    assert_eq!(redelivered.attempt, task.attempt + 1);

    // 6. Result write is conditional on the processing status
    let result = serde_json::json!({ "feedback": "test result" });
    assert!(queries::mark_complete(&db_pool, job_id, result.clone())
        .await
        .expect("mark_complete failed"));
    assert!(
        !queries::mark_complete(&db_pool, job_id, result)
            .await
            .expect("mark_complete failed"),
        "A redelivered task must not produce a second result write"
    );

    // 7. Cleanup: delete-by-prefix empties the job's objects and is
    //    idempotent under retry
    let deleted = state
        .storage
        .delete_prefix(&prefix)
        .await
        .expect("Delete failed");
    assert_eq!(deleted, 2);
    assert!(state
        .storage
        .list(&prefix)
        .await
        .expect("List failed")
        .is_empty());
    let deleted_again = state
        .storage
        .delete_prefix(&prefix)
        .await
        .expect("Second delete must succeed");
    assert_eq!(deleted_again, 0);

    state.queue.complete(&redelivered).await.expect("Ack failed");

    let finished = queries::get_job(&db_pool, job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(finished.status, JobStatus::Complete);
    assert!(finished.result.is_some());
    assert!(finished.completed_at.is_some());
}

/// A failed job releases its artifacts exactly like a successful one.
#[tokio::test]
#[ignore]
async fn test_cleanup_on_permanent_failure() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    let storage = ArtifactStore::new(
        &config.artifact_bucket,
        &config.artifact_endpoint,
        &config.artifact_access_key,
        &config.artifact_secret_key,
    )
    .expect("Failed to initialize artifact store");

    let job_id = Uuid::new_v4();
    let prefix = format!("jobs/{job_id}");
    storage
        .upload(&format!("{prefix}/001.png"), b"fake screenshot", "image/png")
        .await
        .expect("Upload failed");

    queries::create_job(
        &db_pool,
        job_id,
        Pipeline::Bookmark,
        serde_json::json!({}),
        Some(&prefix),
    )
    .await
    .expect("Failed to create job");

    // Simulate the permanent-failure path of the worker skeleton.
    queries::mark_failed(&db_pool, job_id, "No usable input: no screenshot")
        .await
        .expect("mark_failed failed");
    storage.delete_prefix(&prefix).await.expect("Delete failed");

    let job = queries::get_job(&db_pool, job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
    assert!(
        storage
            .list(&prefix)
            .await
            .expect("List failed")
            .is_empty(),
        "Artifact store must hold zero objects for the job after failure"
    );
}

/// Two notifications racing for the same pending job still leave exactly
/// one task in the queue: the loser of the status compare-and-set takes
/// its duplicate copy back.
#[tokio::test]
#[ignore]
async fn test_concurrent_dispatch_yields_one_task() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize queue");

    let job_id = Uuid::new_v4();
    queries::create_job(
        &db_pool,
        job_id,
        Pipeline::Review,
        serde_json::json!({ "review_data": { "user_goals": {}, "daily_summaries": [] } }),
        None,
    )
    .await
    .expect("Failed to create job");

    let (first, second) = tokio::join!(
        dispatcher::dispatch(&db_pool, &queue, job_id, Pipeline::Review, 3),
        dispatcher::dispatch(&db_pool, &queue, job_id, Pipeline::Review, 3),
    );
    first.expect("Dispatch failed");
    second.expect("Dispatch failed");

    let job = queries::get_job(&db_pool, job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(job.status, JobStatus::Enqueued);

    let mut matching = 0;
    while let Some(task) = queue.dequeue().await.expect("Dequeue failed") {
        if task.job_id == job_id {
            matching += 1;
        }
        queue.complete(&task).await.expect("Ack failed");
    }
    assert_eq!(matching, 1, "Exactly one task must exist for the job");
}

/// Tasks a crashed worker left on the processing list are returned to the
/// queue by the reclaim sweep and redelivered.
#[tokio::test]
#[ignore]
async fn test_reclaim_redelivers_in_flight_tasks() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize queue");

    let task = Task {
        job_id: Uuid::new_v4(),
        pipeline: Pipeline::Bookmark,
        attempt: 0,
    };
    queue.enqueue(&task).await.expect("Enqueue failed");
    queue
        .dequeue()
        .await
        .expect("Dequeue failed")
        .expect("Task missing");

    // The worker dies here: the task sits on the processing list, unacked.
    let reclaimed = queue.reclaim_in_flight().await.expect("Reclaim failed");
    assert!(reclaimed >= 1, "In-flight task must be moved back");

    let redelivered = queue
        .dequeue()
        .await
        .expect("Dequeue failed")
        .expect("Reclaimed task missing");
    assert_eq!(redelivered.job_id, task.job_id);
    queue.complete(&redelivered).await.expect("Ack failed");
}

/// Task messages survive a round trip through the queue unchanged.
#[tokio::test]
#[ignore]
async fn test_task_round_trip() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize queue");

    let task = Task {
        job_id: Uuid::new_v4(),
        pipeline: Pipeline::Review,
        attempt: 2,
    };
    queue.enqueue(&task).await.expect("Enqueue failed");

    let dequeued = queue
        .dequeue()
        .await
        .expect("Dequeue failed")
        .expect("Task missing");
    assert_eq!(dequeued.job_id, task.job_id);
    assert_eq!(dequeued.pipeline, Pipeline::Review);
    assert_eq!(dequeued.attempt, 2);

    queue.complete(&dequeued).await.expect("Ack failed");
}

mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{
    engine::GeminiClient, queue::TaskQueue, resolver::Resolver, storage::ArtifactStore,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing doit-analysis server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("analysis_jobs_total", "Total analysis jobs submitted");
    metrics::describe_gauge!(
        "analysis_queue_depth",
        "Current number of pending tasks in the queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize artifact store
    tracing::info!("Initializing artifact store client");
    let storage = ArtifactStore::new(
        &config.artifact_bucket,
        &config.artifact_endpoint,
        &config.artifact_access_key,
        &config.artifact_secret_key,
    )
    .expect("Failed to initialize artifact store");

    // Initialize Redis task queue
    tracing::info!("Connecting to Redis task queue");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize task queue");

    // Initialize classification engine and resolver clients
    tracing::info!("Initializing Gemini client");
    let engine = GeminiClient::new(&config.gemini_api_key, &config.gemini_model);
    let resolver = Resolver::new(config.youtube_api_key.clone());

    let bind_addr = config.bind_addr.clone();

    // Create shared application state
    let state = AppState::new(db_pool, storage, queue, engine, resolver, config);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/jobs/activity",
            post(routes::jobs::submit_activity),
        )
        .route(
            "/api/v1/jobs/bookmark",
            post(routes::jobs::submit_bookmark),
        )
        .route("/api/v1/jobs/review", post(routes::jobs::submit_review))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job_status))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(50 * 1024 * 1024)); // capture sessions are heavy

    tracing::info!("Starting doit-analysis on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}

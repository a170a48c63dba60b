use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    engine::GeminiClient, queue::TaskQueue, resolver::Resolver, storage::ArtifactStore,
};

/// Shared application state passed to route handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<ArtifactStore>,
    pub queue: Arc<TaskQueue>,
    pub engine: Arc<GeminiClient>,
    pub resolver: Arc<Resolver>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        storage: ArtifactStore,
        queue: TaskQueue,
        engine: GeminiClient,
        resolver: Resolver,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            engine: Arc::new(engine),
            resolver: Arc::new(resolver),
            config: Arc::new(config),
        }
    }
}

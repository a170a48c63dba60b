use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connection pool shared by the API process and the worker. Job rows are
/// small and every query is a point read or a conditional update, so a
/// modest pool is plenty; the worker itself processes one task at a time.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect(database_url)
        .await
}

/// Apply pending migrations from ./migrations. Both binaries run this at
/// startup; sqlx's migration bookkeeping makes a second run a no-op.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

pub mod queries;

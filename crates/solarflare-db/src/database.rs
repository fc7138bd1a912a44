use solarflare_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::flare_repository::FlareRepository;
use crate::queue_repository::CollectionQueueRepository;

/// Owns the connection pool, runs migrations and hands out repositories.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    pub fn flare_repo(&self) -> FlareRepository {
        FlareRepository::new(self.pool.clone())
    }

    /// Get a [`CollectionQueueRepository`] bound to `queue_name`.
    pub fn queue_repo(&self, queue_name: &str) -> CollectionQueueRepository {
        CollectionQueueRepository::new(self.pool.clone(), queue_name)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

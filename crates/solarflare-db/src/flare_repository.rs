use chrono::{DateTime, Utc};
use solarflare_core::error::AppError;
use solarflare_core::models::{Flare, NewFlare};
use solarflare_core::traits::{FlareStore, FlareTransaction};
use sqlx::{PgPool, Pool, Postgres, Transaction};

/// Flare persistence in PostgreSQL.
#[derive(Clone)]
pub struct FlareRepository {
    pool: Pool<Postgres>,
}

impl FlareRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<PgFlareTransaction, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open transaction: {e}")))?;
        Ok(PgFlareTransaction { tx })
    }

    pub async fn latest_begin_time(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let (latest,): (Option<DateTime<Utc>>,) =
            sqlx::query_as(r#"SELECT MAX(begin_time) FROM flares"#)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(latest)
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Flare>, AppError> {
        let row = sqlx::query_as::<_, FlareRow>(
            r#"
            SELECT id, external_id, begin_time, peak_time, end_time, class_type,
                   source_location, active_region_num, linked_events, created_at
            FROM flares
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM flares"#)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

/// An open PostgreSQL transaction. Dropping it without `commit` rolls back.
pub struct PgFlareTransaction {
    tx: Transaction<'static, Postgres>,
}

impl FlareTransaction for PgFlareTransaction {
    async fn exists(&mut self, external_id: &str) -> Result<bool, AppError> {
        let (exists,): (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM flares WHERE external_id = $1)"#)
                .bind(external_id)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(exists)
    }

    async fn insert(&mut self, flare: &NewFlare) -> Result<bool, AppError> {
        // a concurrent writer may have committed the same id since `exists`
        let result = sqlx::query(
            r#"
            INSERT INTO flares (external_id, begin_time, peak_time, end_time, class_type,
                                source_location, active_region_num, linked_events)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (external_id) DO NOTHING
            "#,
        )
        .bind(&flare.external_id)
        .bind(flare.begin_time)
        .bind(flare.peak_time)
        .bind(flare.end_time)
        .bind(&flare.class_type)
        .bind(&flare.source_location)
        .bind(flare.active_region_num)
        .bind(&flare.linked_events)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(self) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Commit failed: {e}")))
    }

    async fn rollback(self) -> Result<(), AppError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Rollback failed: {e}")))
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct FlareRow {
    id: i64,
    external_id: String,
    begin_time: DateTime<Utc>,
    peak_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    class_type: String,
    source_location: Option<String>,
    active_region_num: Option<i32>,
    linked_events: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<FlareRow> for Flare {
    fn from(row: FlareRow) -> Self {
        Flare {
            id: row.id,
            external_id: row.external_id,
            begin_time: row.begin_time,
            peak_time: row.peak_time,
            end_time: row.end_time,
            class_type: row.class_type,
            source_location: row.source_location,
            active_region_num: row.active_region_num,
            linked_events: row.linked_events,
            created_at: row.created_at,
        }
    }
}

// -- Trait implementation --

impl FlareStore for FlareRepository {
    type Tx = PgFlareTransaction;

    async fn begin(&self) -> Result<PgFlareTransaction, AppError> {
        FlareRepository::begin(self).await
    }

    async fn latest_begin_time(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        FlareRepository::latest_begin_time(self).await
    }
}

use solarflare_core::error::AppError;
use solarflare_core::models::CollectionRequest;
use solarflare_core::traits::{CollectionQueue, QueueMessage};
use sqlx::{PgPool, Pool, Postgres};

/// PostgreSQL-backed collection request queue.
///
/// Each named queue is a slice of the `collection_requests` table. Receiving
/// deletes the oldest row under `FOR UPDATE SKIP LOCKED`, so competing
/// consumers never see the same message and delivery is also the ack.
#[derive(Clone)]
pub struct CollectionQueueRepository {
    pool: Pool<Postgres>,
    queue_name: String,
}

impl CollectionQueueRepository {
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }

    /// Number of messages waiting on this queue.
    pub async fn pending(&self) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM collection_requests WHERE queue_name = $1"#)
                .bind(&self.queue_name)
                .fetch_one(&self.pool)
                .await
                .map_err(queue_error)?;

        Ok(count)
    }
}

/// Losing the connection is fatal to a consumer; anything else is a
/// per-operation database failure.
fn queue_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => AppError::QueueError(e.to_string()),
        other => AppError::DatabaseError(other.to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    body: String,
}

impl From<MessageRow> for QueueMessage {
    fn from(row: MessageRow) -> Self {
        QueueMessage {
            id: row.id,
            body: row.body,
        }
    }
}

impl CollectionQueue for CollectionQueueRepository {
    async fn declare(&self) -> Result<(), AppError> {
        sqlx::query(r#"SELECT 1 FROM collection_requests LIMIT 1"#)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::QueueError(format!("Queue '{}' unavailable: {e}", self.queue_name))
            })?;

        tracing::debug!(queue = %self.queue_name, "Queue declared");
        Ok(())
    }

    async fn publish(&self, request: &CollectionRequest) -> Result<i64, AppError> {
        let body = serde_json::to_string(request)?;
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO collection_requests (queue_name, body)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(&self.queue_name)
        .bind(&body)
        .fetch_one(&self.pool)
        .await
        .map_err(queue_error)?;

        Ok(id)
    }

    async fn receive(&self) -> Result<Option<QueueMessage>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            DELETE FROM collection_requests
            WHERE id = (
                SELECT id FROM collection_requests
                WHERE queue_name = $1
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, body
            "#,
        )
        .bind(&self.queue_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(queue_error)?;

        Ok(row.map(Into::into))
    }
}

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{CollectionRequest, DateRange, NewFlare, Trigger};

/// Fetches raw flare records from an upstream API.
///
/// Implementations never fail: transport and format problems are logged and
/// come back as an empty JSON array. The body is returned as parsed JSON so
/// the caller can check its shape.
pub trait FlareSource: Send + Sync + Clone {
    fn fetch(&self, range: &DateRange) -> impl Future<Output = serde_json::Value> + Send;
}

/// Persistent flare storage.
pub trait FlareStore: Send + Sync + Clone {
    type Tx: FlareTransaction;

    /// Open a transaction. Inserts made through it are all-or-nothing.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, AppError>> + Send;

    /// Latest `begin_time` across all stored flares.
    fn latest_begin_time(
        &self,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, AppError>> + Send;
}

/// A unit of work against a [`FlareStore`].
///
/// Dropping a transaction without committing discards its writes.
pub trait FlareTransaction: Send {
    fn exists(&mut self, external_id: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Insert a flare. Returns `false` when the external id is already taken,
    /// e.g. by a concurrent writer that committed first.
    fn insert(&mut self, flare: &NewFlare) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A message handed out by a [`CollectionQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: i64,
    pub body: String,
}

/// Durable queue of collection requests.
///
/// Delivery is at-least-once from the publisher's point of view; a message
/// is acknowledged as soon as `receive` returns it.
pub trait CollectionQueue: Send + Sync + Clone {
    /// Make sure the queue exists and is reachable.
    fn declare(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn publish(
        &self,
        request: &CollectionRequest,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Take the next message, or `None` when the queue is empty.
    fn receive(&self) -> impl Future<Output = Result<Option<QueueMessage>, AppError>> + Send;
}

/// Write-only sink for collection metrics. Recording never fails.
pub trait MetricsSink: Send + Sync + Clone {
    fn collection_started(&self, trigger: Trigger);

    fn collection_finished(&self, elapsed: Duration);
}

/// A metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn collection_started(&self, _trigger: Trigger) {}

    fn collection_finished(&self, _elapsed: Duration) {}
}

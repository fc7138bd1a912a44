use std::collections::HashSet;

use crate::error::AppError;
use crate::mapper::map_batch;
use crate::models::{DateRange, IngestSummary, NewFlare};
use crate::traits::{FlareSource, FlareStore, FlareTransaction};

/// Orchestrates the ingestion pipeline: fetch → map → dedup → persist.
///
/// Generic over the upstream source and the store so both can be swapped
/// for in-memory doubles in tests. Running it twice over the same range
/// leaves the store unchanged the second time.
#[derive(Clone)]
pub struct IngestionService<S, T>
where
    S: FlareSource,
    T: FlareStore,
{
    source: S,
    store: T,
}

impl<S, T> IngestionService<S, T>
where
    S: FlareSource,
    T: FlareStore,
{
    pub fn new(source: S, store: T) -> Self {
        Self { source, store }
    }

    /// Ingest every flare the source reports for `range`.
    ///
    /// 1. Fetch raw records (an unexpected body shape ends the call early)
    /// 2. Map each record, skipping the ones that fail
    /// 3. Drop repeated external ids within the batch, keeping the first
    /// 4. Insert the flares the store does not have yet, in one transaction
    ///
    /// Only store errors are returned; the transaction is rolled back first.
    pub async fn ingest(&self, range: &DateRange) -> Result<IngestSummary, AppError> {
        let mut summary = IngestSummary::default();

        // 1. Fetch
        tracing::info!(%range, "Fetching flares");
        let body = self.source.fetch(range).await;
        let Some(records) = body.as_array() else {
            tracing::warn!(%range, kind = json_kind(&body), "Unexpected response shape, skipping");
            return Ok(summary);
        };
        summary.fetched = records.len();

        // 2. Map
        let (mapped, skipped) = map_batch(records);
        summary.mapped = mapped.len();
        summary.skipped = skipped;

        // 3. Dedup within the batch
        let unique = dedup_by_external_id(mapped);
        summary.duplicates_in_batch = summary.mapped - unique.len();
        if unique.is_empty() {
            tracing::info!(%range, ?summary, "Nothing to persist");
            return Ok(summary);
        }

        // 4. Persist
        let mut tx = self.store.begin().await?;
        match persist(&mut tx, &unique, &mut summary).await {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        }

        tracing::info!(
            %range,
            fetched = summary.fetched,
            inserted = summary.inserted,
            already_stored = summary.already_stored,
            skipped = summary.skipped,
            "Ingestion complete"
        );
        Ok(summary)
    }
}

async fn persist<X: FlareTransaction>(
    tx: &mut X,
    flares: &[NewFlare],
    summary: &mut IngestSummary,
) -> Result<(), AppError> {
    for flare in flares {
        if tx.exists(&flare.external_id).await? {
            summary.already_stored += 1;
            continue;
        }
        if tx.insert(flare).await? {
            summary.inserted += 1;
        } else {
            tracing::debug!(external_id = %flare.external_id, "Lost insert race, already stored");
            summary.already_stored += 1;
        }
    }
    Ok(())
}

/// Keep the first flare for each external id, preserving order.
pub fn dedup_by_external_id(flares: Vec<NewFlare>) -> Vec<NewFlare> {
    let mut seen = HashSet::with_capacity(flares.len());
    flares
        .into_iter()
        .filter(|flare| seen.insert(flare.external_id.clone()))
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

use chrono::{DateTime, Days, TimeDelta, Utc};

use crate::error::AppError;
use crate::models::DateRange;
use crate::traits::FlareStore;

/// Days to look back when the store holds no flares yet.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 7;

/// Computes the next fetch window from what is already stored.
///
/// The window starts on the day of the latest stored `begin_time` (plus one
/// second) and ends today. Truncating to days re-fetches part of the last
/// day; ingestion dedup absorbs that overlap.
#[derive(Clone)]
pub struct RangePlanner<T: FlareStore> {
    store: T,
    lookback: Days,
}

impl<T: FlareStore> RangePlanner<T> {
    pub fn new(store: T) -> Self {
        Self {
            store,
            lookback: Days::new(DEFAULT_LOOKBACK_DAYS),
        }
    }

    pub fn with_lookback_days(mut self, days: u64) -> Self {
        self.lookback = Days::new(days);
        self
    }

    pub async fn next_window(&self) -> Result<DateRange, AppError> {
        let latest = self.store.latest_begin_time().await?;
        Ok(window_for(latest, Utc::now(), self.lookback))
    }
}

/// Window policy, separated from the clock and the store.
///
/// A latest timestamp in the future is clamped so the window never inverts.
pub fn window_for(
    latest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookback: Days,
) -> DateRange {
    let today = now.date_naive();
    let start = match latest {
        Some(latest) => (latest + TimeDelta::seconds(1)).date_naive(),
        None => today.checked_sub_days(lookback).unwrap_or(today),
    };
    DateRange::clamped(start, today)
}

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::time::{format_ymd, to_ymd};

/// A stored solar flare event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flare {
    pub id: i64,
    /// Upstream identifier, unique across the table.
    pub external_id: String,
    pub begin_time: DateTime<Utc>,
    pub peak_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Magnitude class such as `M1.0`; empty when upstream omits it.
    pub class_type: String,
    /// Heliographic coordinates, e.g. `N10E10`.
    pub source_location: Option<String>,
    pub active_region_num: Option<i32>,
    /// Linked CME/SEP events, kept exactly as upstream sent them.
    pub linked_events: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// DTO for inserting a new flare. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFlare {
    pub external_id: String,
    pub begin_time: DateTime<Utc>,
    pub peak_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub class_type: String,
    pub source_location: Option<String>,
    pub active_region_num: Option<i32>,
    pub linked_events: Option<serde_json::Value>,
}

/// Inclusive day range used to query the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::InvalidDate(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a range, pulling `start` back to `end` if it lies after it.
    pub fn clamped(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.min(end),
            end,
        }
    }

    /// Build a range from two date or timestamp strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        Self::new(to_ymd(start)?, to_ymd(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", format_ymd(self.start), format_ymd(self.end))
    }
}

/// Body of a message on the collection request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub start_date: String,
    pub end_date: String,
}

impl CollectionRequest {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
        }
    }

    pub fn from_range(range: &DateRange) -> Self {
        Self::new(format_ymd(range.start()), format_ymd(range.end()))
    }

    /// Parse a raw message body into the window it asks for.
    pub fn parse_body(body: &str) -> Result<DateRange, AppError> {
        let request: CollectionRequest = serde_json::from_str(body)?;
        request.range()
    }

    pub fn range(&self) -> Result<DateRange, AppError> {
        DateRange::parse(&self.start_date, &self.end_date)
    }
}

/// Outcome counters for one ingestion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Raw records returned by the source.
    pub fetched: usize,
    /// Records that mapped to a flare.
    pub mapped: usize,
    /// Records the mapper rejected.
    pub skipped: usize,
    /// Mapped flares dropped because an earlier record had the same id.
    pub duplicates_in_batch: usize,
    /// Flares whose id was already in the store.
    pub already_stored: usize,
    pub inserted: usize,
}

/// What started an ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The periodic scheduler.
    Scheduled,
    /// A message from the collection request queue.
    Requested,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Requested => "requested",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

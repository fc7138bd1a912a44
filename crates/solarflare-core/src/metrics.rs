//! In-process collection metrics with Prometheus text exposition.
//!
//! Counters and histogram buckets are plain atomics, so the scheduler and
//! the listener can record concurrently through cheap clones.

use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::models::Trigger;
use crate::traits::MetricsSink;

pub const COLLECTION_TOTAL: &str = "solar_flare_collection_total";
pub const COLLECTION_DURATION: &str = "solar_flare_collection_duration_seconds";

/// Upper bounds (seconds) of the duration histogram buckets.
const BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Debug, Default)]
struct Inner {
    scheduled: AtomicU64,
    requested: AtomicU64,
    /// Non-cumulative counts; index `BUCKETS.len()` is the overflow bucket.
    buckets: [AtomicU64; BUCKETS.len() + 1],
    duration_sum_micros: AtomicU64,
    duration_count: AtomicU64,
}

/// Collection counter and duration histogram.
#[derive(Debug, Default, Clone)]
pub struct CollectionMetrics {
    inner: Arc<Inner>,
}

impl CollectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collections(&self, trigger: Trigger) -> u64 {
        self.counter(trigger).load(Ordering::Relaxed)
    }

    pub fn observations(&self) -> u64 {
        self.inner.duration_count.load(Ordering::Relaxed)
    }

    /// Render all series in the Prometheus text format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "# HELP {COLLECTION_TOTAL} Total number of solar flare collection events triggered"
        );
        let _ = writeln!(out, "# TYPE {COLLECTION_TOTAL} counter");
        for trigger in [Trigger::Scheduled, Trigger::Requested] {
            let _ = writeln!(
                out,
                "{COLLECTION_TOTAL}{{trigger=\"{trigger}\"}} {}",
                self.collections(trigger)
            );
        }

        let _ = writeln!(
            out,
            "# HELP {COLLECTION_DURATION} Time in seconds spent collecting and inserting solar flare data"
        );
        let _ = writeln!(out, "# TYPE {COLLECTION_DURATION} histogram");
        let mut cumulative = 0;
        for (i, bound) in BUCKETS.iter().enumerate() {
            cumulative += self.inner.buckets[i].load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "{COLLECTION_DURATION}_bucket{{le=\"{bound}\"}} {cumulative}"
            );
        }
        cumulative += self.inner.buckets[BUCKETS.len()].load(Ordering::Relaxed);
        let _ = writeln!(
            out,
            "{COLLECTION_DURATION}_bucket{{le=\"+Inf\"}} {cumulative}"
        );
        let sum = self.inner.duration_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{COLLECTION_DURATION}_sum {sum}");
        let _ = writeln!(out, "{COLLECTION_DURATION}_count {}", self.observations());

        out
    }

    fn counter(&self, trigger: Trigger) -> &AtomicU64 {
        match trigger {
            Trigger::Scheduled => &self.inner.scheduled,
            Trigger::Requested => &self.inner.requested,
        }
    }
}

impl MetricsSink for CollectionMetrics {
    fn collection_started(&self, trigger: Trigger) {
        self.counter(trigger).fetch_add(1, Ordering::Relaxed);
    }

    fn collection_finished(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let bucket = BUCKETS
            .iter()
            .position(|bound| secs <= *bound)
            .unwrap_or(BUCKETS.len());
        self.inner.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.inner
            .duration_sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.inner.duration_count.fetch_add(1, Ordering::Relaxed);
    }
}

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ingest::IngestionService;
use crate::models::Trigger;
use crate::planner::RangePlanner;
use crate::reporter::{CollectorEvent, CollectorReporter};
use crate::traits::{FlareSource, FlareStore, MetricsSink};

pub const DEFAULT_COLLECT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fires an ingestion over the planned window on a fixed period.
///
/// The first firing happens immediately. Firings run inline on the timer
/// loop, and ticks that come due while one is running are dropped rather
/// than fired late, so two scheduled firings never overlap and the schedule
/// stays aligned to the first tick.
pub struct CollectionScheduler<S, T, M>
where
    S: FlareSource,
    T: FlareStore,
    M: MetricsSink,
{
    service: IngestionService<S, T>,
    planner: RangePlanner<T>,
    metrics: M,
    interval: Duration,
}

impl<S, T, M> CollectionScheduler<S, T, M>
where
    S: FlareSource,
    T: FlareStore,
    M: MetricsSink,
{
    pub fn new(service: IngestionService<S, T>, planner: RangePlanner<T>, metrics: M) -> Self {
        Self {
            service,
            planner,
            metrics,
            interval: DEFAULT_COLLECT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until cancelled. A firing in progress when the token is
    /// cancelled is allowed to finish.
    pub async fn run<R: CollectorReporter>(&self, cancel_token: CancellationToken, reporter: &R) {
        reporter.report(CollectorEvent::SchedulerStarted {
            interval: self.interval,
        });

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_finished: Option<Instant> = None;

        loop {
            let due = tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                due = ticker.tick() => due,
            };

            // the interval still hands back one overdue tick after a slow firing
            if let Some(finished) = last_finished
                && due < finished
            {
                reporter.report(CollectorEvent::TickSkipped {
                    late_by: finished - due,
                });
                continue;
            }

            self.fire(reporter).await;
            last_finished = Some(Instant::now());
        }

        reporter.report(CollectorEvent::Stopped {
            component: "scheduler",
        });
    }

    /// One scheduled collection: plan, ingest, record.
    pub async fn fire<R: CollectorReporter>(&self, reporter: &R) {
        let range = match self.planner.next_window().await {
            Ok(range) => range,
            Err(e) => {
                let error = e.to_string();
                reporter.report(CollectorEvent::PlanningFailed { error: &error });
                return;
            }
        };

        let trigger = Trigger::Scheduled;
        reporter.report(CollectorEvent::CollectionStarted {
            trigger,
            range: &range,
        });
        self.metrics.collection_started(trigger);
        let started = Instant::now();
        let result = self.service.ingest(&range).await;
        let elapsed = started.elapsed();
        self.metrics.collection_finished(elapsed);

        match result {
            Ok(summary) => reporter.report(CollectorEvent::CollectionCompleted {
                trigger,
                range: &range,
                summary: &summary,
                elapsed,
            }),
            Err(e) => {
                let error = e.to_string();
                reporter.report(CollectorEvent::CollectionFailed {
                    trigger,
                    range: &range,
                    error: &error,
                });
            }
        }
    }
}

use std::time::Duration;

use crate::models::{DateRange, IngestSummary, Trigger};

/// Events emitted by the scheduler and the listener for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CollectorEvent<'a> {
    SchedulerStarted {
        interval: Duration,
    },
    ListenerStarted {
        queue: &'a str,
        consumer: &'a str,
    },
    CollectionStarted {
        trigger: Trigger,
        range: &'a DateRange,
    },
    CollectionCompleted {
        trigger: Trigger,
        range: &'a DateRange,
        summary: &'a IngestSummary,
        elapsed: Duration,
    },
    CollectionFailed {
        trigger: Trigger,
        range: &'a DateRange,
        error: &'a str,
    },
    /// A tick came due while the previous firing was still running.
    TickSkipped {
        late_by: Duration,
    },
    PlanningFailed {
        error: &'a str,
    },
    MessageRejected {
        message_id: i64,
        error: &'a str,
    },
    ReceiveFailed {
        error: &'a str,
    },
    Stopped {
        component: &'static str,
    },
}

impl CollectorEvent<'_> {
    /// Short stable name, handy for assertions and log grepping.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorEvent::SchedulerStarted { .. } => "scheduler_started",
            CollectorEvent::ListenerStarted { .. } => "listener_started",
            CollectorEvent::CollectionStarted { .. } => "collection_started",
            CollectorEvent::CollectionCompleted { .. } => "collection_completed",
            CollectorEvent::CollectionFailed { .. } => "collection_failed",
            CollectorEvent::TickSkipped { .. } => "tick_skipped",
            CollectorEvent::PlanningFailed { .. } => "planning_failed",
            CollectorEvent::MessageRejected { .. } => "message_rejected",
            CollectorEvent::ReceiveFailed { .. } => "receive_failed",
            CollectorEvent::Stopped { .. } => "stopped",
        }
    }
}

/// Trait for receiving collector events (decoupled logging).
pub trait CollectorReporter: Send + Sync {
    fn report(&self, event: CollectorEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCollectorReporter;

impl CollectorReporter for TracingCollectorReporter {
    fn report(&self, event: CollectorEvent<'_>) {
        match event {
            CollectorEvent::SchedulerStarted { interval } => {
                tracing::info!(interval_secs = interval.as_secs(), "Scheduler started");
            }
            CollectorEvent::ListenerStarted { queue, consumer } => {
                tracing::info!(%queue, %consumer, "Listening for collection requests");
            }
            CollectorEvent::CollectionStarted { trigger, range } => {
                tracing::info!(%trigger, %range, "Collection triggered");
            }
            CollectorEvent::CollectionCompleted {
                trigger,
                range,
                summary,
                elapsed,
            } => {
                tracing::info!(
                    %trigger,
                    %range,
                    inserted = summary.inserted,
                    already_stored = summary.already_stored,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Collection completed"
                );
            }
            CollectorEvent::CollectionFailed {
                trigger,
                range,
                error,
            } => {
                tracing::error!(%trigger, %range, %error, "Collection failed");
            }
            CollectorEvent::TickSkipped { late_by } => {
                tracing::warn!(
                    late_by_ms = late_by.as_millis() as u64,
                    "Previous collection overran the interval, skipping tick"
                );
            }
            CollectorEvent::PlanningFailed { error } => {
                tracing::error!(%error, "Could not plan collection window");
            }
            CollectorEvent::MessageRejected { message_id, error } => {
                tracing::warn!(%message_id, %error, "Rejected collection request");
            }
            CollectorEvent::ReceiveFailed { error } => {
                tracing::warn!(%error, "Failed to receive from queue");
            }
            CollectorEvent::Stopped { component } => {
                tracing::info!(%component, "Stopped");
            }
        }
    }
}

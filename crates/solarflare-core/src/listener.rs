use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::IngestionService;
use crate::models::{CollectionRequest, Trigger};
use crate::reporter::{CollectorEvent, CollectorReporter};
use crate::traits::{CollectionQueue, FlareSource, FlareStore, MetricsSink, QueueMessage};

pub const DEFAULT_QUEUE_NAME: &str = "data_collection_queue";

/// Configuration for the collection request listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Identifies this consumer in logs.
    pub consumer_tag: String,
    /// How long to wait before polling an empty queue again.
    pub poll_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            consumer_tag: format!("collector-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl ListenerConfig {
    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Consumes collection requests and ingests the window each one asks for.
///
/// Messages are acknowledged on receipt. A redelivered or repeated request
/// is harmless because ingestion is idempotent.
pub struct CollectionListener<Q, S, T, M>
where
    Q: CollectionQueue,
    S: FlareSource,
    T: FlareStore,
    M: MetricsSink,
{
    queue: Q,
    queue_name: String,
    service: IngestionService<S, T>,
    metrics: M,
    config: ListenerConfig,
}

impl<Q, S, T, M> CollectionListener<Q, S, T, M>
where
    Q: CollectionQueue,
    S: FlareSource,
    T: FlareStore,
    M: MetricsSink,
{
    pub fn new(
        queue: Q,
        queue_name: impl Into<String>,
        service: IngestionService<S, T>,
        metrics: M,
        config: ListenerConfig,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            service,
            metrics,
            config,
        }
    }

    /// Run the consume loop until cancellation.
    ///
    /// Returns an error only when the queue itself becomes unusable; bad
    /// messages and failed ingestions are reported and skipped.
    pub async fn run<R: CollectorReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        self.queue.declare().await?;
        reporter.report(CollectorEvent::ListenerStarted {
            queue: &self.queue_name,
            consumer: &self.config.consumer_tag,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            match self.queue.receive().await {
                Ok(Some(message)) => self.handle(&message, reporter).await,
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) if e.is_fatal_to_listener() => {
                    reporter.report(CollectorEvent::Stopped {
                        component: "listener",
                    });
                    return Err(e);
                }
                Err(e) => {
                    let error = e.to_string();
                    reporter.report(CollectorEvent::ReceiveFailed { error: &error });
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        reporter.report(CollectorEvent::Stopped {
            component: "listener",
        });
        Ok(())
    }

    async fn handle<R: CollectorReporter>(&self, message: &QueueMessage, reporter: &R) {
        let range = match CollectionRequest::parse_body(&message.body) {
            Ok(range) => range,
            Err(e) => {
                let error = e.to_string();
                reporter.report(CollectorEvent::MessageRejected {
                    message_id: message.id,
                    error: &error,
                });
                return;
            }
        };

        let trigger = Trigger::Requested;
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

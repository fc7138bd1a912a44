pub mod error;
pub mod ingest;
pub mod listener;
pub mod mapper;
pub mod metrics;
pub mod models;
pub mod planner;
pub mod reporter;
pub mod scheduler;
pub mod time;
pub mod traits;


pub use error::AppError;
pub use ingest::IngestionService;
pub use listener::{CollectionListener, DEFAULT_QUEUE_NAME, ListenerConfig};
pub use metrics::CollectionMetrics;
pub use models::{CollectionRequest, DateRange, Flare, IngestSummary, NewFlare, Trigger};
pub use planner::RangePlanner;
pub use reporter::{CollectorEvent, CollectorReporter, TracingCollectorReporter};
pub use scheduler::CollectionScheduler;
pub use traits::{
    CollectionQueue, FlareSource, FlareStore, FlareTransaction, MetricsSink, NullMetrics,
    QueueMessage,
};

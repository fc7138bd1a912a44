pub mod config;
pub mod database;
pub mod flare_repository;
pub mod queue_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use flare_repository::{FlareRepository, PgFlareTransaction};
pub use queue_repository::CollectionQueueRepository;

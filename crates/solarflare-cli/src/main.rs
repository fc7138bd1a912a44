mod monitor;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use solarflare_client::{DEFAULT_DONKI_FLR_URL, DonkiClient};
use solarflare_core::traits::CollectionQueue;
use solarflare_core::{
    CollectionListener, CollectionMetrics, CollectionRequest, CollectionScheduler,
    DEFAULT_QUEUE_NAME, DateRange, IngestionService, ListenerConfig, RangePlanner,
    TracingCollectorReporter,
};
use solarflare_db::{Database, DatabaseConfig};

use crate::monitor::MonitorState;

#[derive(Parser)]
#[command(name = "solarflare", version, about = "NASA DONKI solar flare collector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the periodic scheduler and the request listener until stopped
    Collect {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        planner: PlannerArgs,

        /// Hours between scheduled collections
        #[arg(long, env = "COLLECT_INTERVAL_HOURS", default_value_t = 24)]
        interval_hours: u64,

        /// Seconds to wait before polling an empty request queue again
        #[arg(long, env = "COLLECT_POLL_INTERVAL_SECS", default_value_t = 5)]
        poll_interval_secs: u64,

        /// Queue to consume collection requests from
        #[arg(long, env = "COLLECT_QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME)]
        queue: String,

        /// Serve /metrics and /health on this address
        #[arg(long, env = "METRICS_ADDR")]
        metrics_addr: Option<SocketAddr>,
    },

    /// Ingest flares for one date range and print the summary
    Ingest {
        #[command(flatten)]
        source: SourceArgs,

        /// First day (YYYY-MM-DD or ISO-8601 timestamp)
        #[arg(short, long)]
        start: String,

        /// Last day, inclusive
        #[arg(short, long)]
        end: String,
    },

    /// Print the window the next scheduled collection would request
    Window {
        #[command(flatten)]
        planner: PlannerArgs,
    },

    /// Publish a collection request for the listener to pick up
    Trigger {
        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        end: String,

        #[arg(long, env = "COLLECT_QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME)]
        queue: String,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// NASA API key
    #[arg(long, env = "NASA_API_KEY")]
    api_key: String,

    /// DONKI flare endpoint
    #[arg(long, env = "NASA_API_URL", default_value = DEFAULT_DONKI_FLR_URL)]
    api_url: String,

    /// Request timeout in seconds
    #[arg(long, env = "NASA_API_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

impl SourceArgs {
    fn client(&self) -> Result<DonkiClient> {
        let client = DonkiClient::with_base_url(&self.api_key, &self.api_url)?
            .with_timeout(Duration::from_secs(self.timeout_secs))?;
        Ok(client)
    }
}

#[derive(Args)]
struct PlannerArgs {
    /// Days to look back when no flares are stored yet
    #[arg(long, env = "COLLECT_LOOKBACK_DAYS", default_value_t = 7)]
    lookback_days: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("solarflare=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect {
            source,
            planner,
            interval_hours,
            poll_interval_secs,
            queue,
            metrics_addr,
        } => {
            let options = CollectOptions {
                interval: collect_interval(interval_hours)?,
                poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
                lookback_days: planner.lookback_days,
                queue,
                metrics_addr,
            };
            let db = connect_db().await?;
            cmd_collect(source.client()?, db, options).await?;
        }
        Commands::Ingest { source, start, end } => {
            let range = DateRange::parse(&start, &end)?;
            let db = connect_db().await?;
            cmd_ingest(source.client()?, &db, &range).await?;
        }
        Commands::Window { planner } => {
            let db = connect_db().await?;
            let range = RangePlanner::new(db.flare_repo())
                .with_lookback_days(planner.lookback_days)
                .next_window()
                .await?;
            println!("{range}");
        }
        Commands::Trigger { start, end, queue } => {
            let range = DateRange::parse(&start, &end)?;
            let db = connect_db().await?;
            cmd_trigger(&db, &queue, &range).await?;
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

/// Scheduler period for `hours`, rejecting zero and values that overflow.
fn collect_interval(hours: u64) -> Result<Duration> {
    if hours == 0 {
        anyhow::bail!("COLLECT_INTERVAL_HOURS must be at least 1");
    }
    let Some(secs) = hours.checked_mul(60 * 60) else {
        anyhow::bail!("COLLECT_INTERVAL_HOURS {hours} is too large");
    };
    Ok(Duration::from_secs(secs))
}

struct CollectOptions {
    interval: Duration,
    poll_interval: Duration,
    lookback_days: u64,
    queue: String,
    metrics_addr: Option<SocketAddr>,
}

async fn cmd_collect(client: DonkiClient, db: Database, options: CollectOptions) -> Result<()> {
    let flares = db.flare_repo();
    let metrics = CollectionMetrics::new();
    let service = IngestionService::new(client, flares.clone());

    let scheduler = CollectionScheduler::new(
        service.clone(),
        RangePlanner::new(flares.clone()).with_lookback_days(options.lookback_days),
        metrics.clone(),
    )
    .with_interval(options.interval);

    let listener = CollectionListener::new(
        db.queue_repo(&options.queue),
        options.queue.as_str(),
        service,
        metrics.clone(),
        ListenerConfig::default().with_poll_interval(options.poll_interval),
    );

    let cancel = CancellationToken::new();

    // bind up front so a bad --metrics-addr stops the collector before it starts
    let monitor_task = match options.metrics_addr {
        Some(addr) => {
            let listener = monitor::bind(addr).await?;
            let state = Arc::new(MonitorState { metrics, flares });
            Some(tokio::spawn(monitor::serve(listener, state, cancel.clone())))
        }
        None => None,
    };

    let scheduler_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(cancel, &TracingCollectorReporter).await }
    });
    let mut listener_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { listener.run(cancel, &TracingCollectorReporter).await }
    });

    let listener_result = tokio::select! {
        () = shutdown_signal() => {
            cancel.cancel();
            listener_task.await.context("Listener task panicked")?
        }
        result = &mut listener_task => {
            // the listener only returns early when the queue is gone
            cancel.cancel();
            result.context("Listener task panicked")?
        }
    };

    scheduler_task.await.context("Scheduler task panicked")?;
    if let Some(monitor_task) = monitor_task {
        match monitor_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Monitoring server failed"),
            Err(e) => tracing::error!(error = %e, "Monitoring server panicked"),
        }
    }

    listener_result.context("Collection request listener stopped")?;
    tracing::info!("Collector stopped");
    Ok(())
}

async fn cmd_ingest(client: DonkiClient, db: &Database, range: &DateRange) -> Result<()> {
    tracing::info!(%range, "Ingesting flares");
    let service = IngestionService::new(client, db.flare_repo());
    let summary = service.ingest(range).await?;

    tracing::info!(
        inserted = summary.inserted,
        already_stored = summary.already_stored,
        skipped = summary.skipped,
        "Ingest finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_trigger(db: &Database, queue_name: &str, range: &DateRange) -> Result<()> {
    let queue = db.queue_repo(queue_name);
    queue.declare().await?;

    let id = queue.publish(&CollectionRequest::from_range(range)).await?;
    let pending = queue.pending().await?;

    tracing::info!(id, queue = queue_name, %range, "Collection request published");
    println!("Published request {id} for {range} on '{queue_name}' ({pending} pending)");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}

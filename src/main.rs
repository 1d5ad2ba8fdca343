//! Command-line entry point.
//!
//! With no `--internal-role`, this runs the orchestrator: one-time
//! initialization followed by the embedded fetcher shard 0 and supervision
//! of spawned fetcher/parser child processes. With `--internal-role
//! fetcher`/`parser`, it instead runs a standalone worker pool — this is
//! how the orchestrator re-invokes itself for every child process.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use politecrawl::cli::{setup_logging, Cli};
use politecrawl::config::{self, CrawlerConfig};
use politecrawl::fetch::build_client;
use politecrawl::frontier::FrontierManager;
use politecrawl::metrics::Metrics;
use politecrawl::politeness::PolitenessEnforcer;
use politecrawl::process::{self, FetcherProcess, ParserConsumer, ShutdownFlag};
use politecrawl::redis_client::{with_retry, RedisPools};
use politecrawl::redis_keys;
use politecrawl::CrawlError;

const METRICS_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Flushes `metrics` on a fixed interval until aborted, so the Prometheus
/// textfile collector reflects a long-running worker's live state rather
/// than only its state at exit.
fn spawn_periodic_flush(role: &'static str, id: u32, metrics: Arc<Metrics>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(METRICS_FLUSH_INTERVAL).await;
            if let Err(e) = metrics.flush(role, std::process::id()) {
                tracing::warn!(role, id, error = %e, "failed to flush metrics");
            }
        }
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let config = match config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    let result = match cli.internal_role.as_deref() {
        None => process::orchestrator::run(&cli, config).await,
        Some("fetcher") => run_standalone_fetcher(&cli, config).await,
        Some("parser") => run_standalone_parser(&cli, config).await,
        Some(other) => {
            tracing::error!(role = other, "unknown --internal-role");
            return ExitCode::from(1);
        }
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            tracing::error!(error = %e, "crawler exited with an error");
            ExitCode::from(2)
        }
    }
}

/// Runs one fetcher shard as a standalone OS process (every shard except 0,
/// which the orchestrator hosts in-process).
async fn run_standalone_fetcher(cli: &Cli, config: CrawlerConfig) -> politecrawl::Result<()> {
    let id = cli
        .internal_id
        .ok_or_else(|| CrawlError::Fatal("--internal-role fetcher requires --internal-id".into()))?;

    let shutdown = ShutdownFlag::new();
    process::shutdown::install_signal_handlers(shutdown.clone());

    let pools = RedisPools::connect(&config.redis.connection_url()).await?;
    let http_client = build_client(&config.user_agent)?;
    let politeness = Arc::new(PolitenessEnforcer::new(
        pools.text(),
        http_client.clone(),
        config.user_agent.clone(),
        config.seeded_urls_only,
    ));
    let shard_count = read_shard_count(&pools.text()).await?;
    let frontier = Arc::new(FrontierManager::new(
        pools.text(),
        config.data_dir.clone(),
        politeness,
        shard_count,
    ));
    let metrics = Arc::new(Metrics::new("fetcher", id));

    let fetcher = Arc::new(FetcherProcess::new(
        u64::from(id),
        &config,
        frontier,
        pools.bytes(),
        pools.text(),
        http_client,
        Arc::clone(&metrics),
        shutdown,
    ));
    let flush_task = spawn_periodic_flush("fetcher", id, Arc::clone(&metrics));
    fetcher.run().await;
    flush_task.abort();

    metrics.flush("fetcher", std::process::id())?;
    Ok(())
}

/// Runs one parser worker pool as a standalone OS process.
async fn run_standalone_parser(cli: &Cli, config: CrawlerConfig) -> politecrawl::Result<()> {
    let id = cli
        .internal_id
        .ok_or_else(|| CrawlError::Fatal("--internal-role parser requires --internal-id".into()))?;

    let shutdown = ShutdownFlag::new();
    process::shutdown::install_signal_handlers(shutdown.clone());

    let pools = RedisPools::connect(&config.redis.connection_url()).await?;
    let http_client = build_client(&config.user_agent)?;
    let politeness = Arc::new(PolitenessEnforcer::new(
        pools.text(),
        http_client,
        config.user_agent.clone(),
        config.seeded_urls_only,
    ));
    let shard_count = read_shard_count(&pools.text()).await?;
    let frontier = Arc::new(FrontierManager::new(
        pools.text(),
        config.data_dir.clone(),
        politeness,
        shard_count,
    ));
    let metrics = Arc::new(Metrics::new("parser", id));

    let parser = Arc::new(ParserConsumer::new(
        id,
        &config,
        frontier,
        pools.bytes(),
        pools.text(),
        Arc::clone(&metrics),
        shutdown,
    ));
    let flush_task = spawn_periodic_flush("parser", id, Arc::clone(&metrics));
    parser.run().await;
    flush_task.abort();

    metrics.flush("parser", std::process::id())?;
    Ok(())
}

/// Standalone fetcher/parser processes never reshard — only the
/// orchestrator does, under `lock:init` — so they just read whatever shard
/// count is currently published.
async fn read_shard_count(conn: &ConnectionManager) -> politecrawl::Result<u64> {
    let value: Option<u64> = with_retry("read shard_count", || {
        let mut conn = conn.clone();
        async move { conn.get(redis_keys::shard_count()).await }
    })
    .await?;
    Ok(value.unwrap_or(1))
}

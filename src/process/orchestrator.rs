//! Process lifecycle: one-time global initialization, resharding, child
//! supervision, and stopping-condition evaluation. Runs fetcher shard 0
//! in-process (the leader model).

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::process::{Child, Command};

use crate::bloom;
use crate::cli::Cli;
use crate::config::CrawlerConfig;
use crate::fetch::build_client;
use crate::frontier::{shard_for, FrontierManager};
use crate::metrics::Metrics;
use crate::politeness::PolitenessEnforcer;
use crate::process::fetcher::FetcherProcess;
use crate::process::shutdown::{self, ShutdownFlag};
use crate::redis_client::{with_retry, RedisPools};
use crate::redis_keys;
use crate::seedfile;
use crate::shard_lock::LockManager;
use crate::{CrawlError, RedisOpError, Result};

const INIT_LOCK_TTL: Duration = Duration::from_secs(60);
const INIT_LOCK_WAIT: Duration = Duration::from_secs(30);
const SUPERVISION_INTERVAL: Duration = Duration::from_secs(5);
const CHILD_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const SCHEMA_VERSION: &str = "politecrawl-v1";
const CONSECUTIVE_EMPTY_CHECKS_TO_STOP: u32 = 2;

/// Runs the whole crawl: initialization, spawning fetcher/parser children,
/// hosting fetcher shard 0, and supervising until a stopping condition
/// fires or a signal requests shutdown.
pub async fn run(cli: &Cli, config: CrawlerConfig) -> Result<()> {
    let shutdown = ShutdownFlag::new();
    shutdown::install_signal_handlers(shutdown.clone());

    let pools = RedisPools::connect(&config.redis.connection_url()).await?;
    let mut lock_manager = LockManager::new(pools.text());

    lock_manager
        .clear_if_owned_by_dead_process("init", pid_is_alive)
        .await?;
    let init_lock = lock_manager
        .acquire("init", INIT_LOCK_TTL, INIT_LOCK_WAIT)
        .await?;

    let shard_count =
        reshard_if_needed(&pools.text(), u64::from(config.num_fetcher_processes)).await?;

    if !config.resume {
        clear_fresh_state(&config, &pools.text()).await?;
    }

    initialize_storage(&config.data_dir, &pools.text()).await?;

    let http_client = build_client(&config.user_agent)?;
    let politeness = Arc::new(PolitenessEnforcer::new(
        pools.text(),
        http_client.clone(),
        config.user_agent.clone(),
        config.seeded_urls_only,
    ));

    load_exclusions(&config, &politeness).await?;
    bloom::ensure_created(&pools.text()).await?;

    let frontier = Arc::new(FrontierManager::new(
        pools.text(),
        config.data_dir.clone(),
        Arc::clone(&politeness),
        shard_count,
    ));

    seed_frontier(&config, &politeness, &frontier).await?;

    if config.resume {
        reconcile_all_domains(&frontier, &pools.text()).await?;
    }

    init_lock.release().await?;
    tracing::info!("initialization complete, starting fetcher and parser processes");

    let metrics = Arc::new(Metrics::new("orchestrator", 0));
    let fetcher0 = Arc::new(FetcherProcess::new(
        0,
        &config,
        Arc::clone(&frontier),
        pools.bytes(),
        pools.text(),
        http_client,
        Arc::clone(&metrics),
        shutdown.clone(),
    ));
    let fetcher0_handle = tokio::spawn({
        let fetcher0 = Arc::clone(&fetcher0);
        async move { fetcher0.run().await }
    });

    let mut children = spawn_children(cli, &config)?;

    supervise(
        cli,
        &config,
        &pools.text(),
        &pools.bytes(),
        &mut children,
        &shutdown,
        &metrics,
    )
    .await;

    shutdown.set();
    let _: std::result::Result<(), RedisOpError> = with_retry("set shutdown flag", || {
        let mut conn = pools.text();
        async move { conn.set(redis_keys::shutdown_flag(), 1).await }
    })
    .await;
    let _ = fetcher0_handle.await;
    terminate_children(&mut children).await;
    metrics
        .flush("orchestrator", std::process::id())
        .map_err(CrawlError::Io)?;

    tracing::info!("orchestrator shutdown complete");
    Ok(())
}

fn pid_is_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

/// §4.3.1: drains every domain from the old shard queues and redistributes
/// them by the consistent hash into the new shard count. A no-op when the
/// shard count is unchanged.
async fn reshard_if_needed(conn: &ConnectionManager, new_count: u64) -> Result<u64> {
    let old_count: u64 = with_retry("get shard_count", || {
        let mut conn = conn.clone();
        async move {
            let value: Option<u64> = conn.get(redis_keys::shard_count()).await?;
            Ok(value.unwrap_or(1))
        }
    })
    .await?;

    if old_count == new_count {
        return Ok(new_count);
    }

    tracing::info!(old_count, new_count, "resharding domain queues");

    for shard in 0..old_count {
        let queue_key = redis_keys::domain_queue(shard);
        loop {
            let domain: Option<String> = with_retry("drain shard queue", || {
                let mut conn = conn.clone();
                let queue_key = queue_key.clone();
                async move { conn.lpop(&queue_key, None).await }
            })
            .await?;
            let Some(domain) = domain else { break };

            let new_shard = shard_for(&domain, new_count);
            let new_queue_key = redis_keys::domain_queue(new_shard);
            let _: () = with_retry("reshard push", || {
                let mut conn = conn.clone();
                let new_queue_key = new_queue_key.clone();
                let domain = domain.clone();
                async move { conn.rpush(&new_queue_key, domain).await }
            })
            .await?;
        }
    }

    let _: () = with_retry("set shard_count", || {
        let mut conn = conn.clone();
        async move { conn.set(redis_keys::shard_count(), new_count).await }
    })
    .await?;

    Ok(new_count)
}

async fn clear_fresh_state(config: &CrawlerConfig, conn: &ConnectionManager) -> Result<()> {
    tracing::info!("fresh start requested: clearing existing crawl state");

    let shard_count: u64 = with_retry("get shard_count for clear", || {
        let mut conn = conn.clone();
        async move {
            let value: Option<u64> = conn.get(redis_keys::shard_count()).await?;
            Ok(value.unwrap_or(1))
        }
    })
    .await?;

    for shard in 0..shard_count {
        let key = redis_keys::domain_queue(shard);
        let _: () = with_retry("delete shard queue", || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move { conn.del(&key).await }
        })
        .await?;
    }

    delete_matching(conn, "domain:*").await?;

    let _: () = with_retry("delete bloom filter", || {
        let mut conn = conn.clone();
        async move { conn.del(redis_keys::seen_bloom()).await }
    })
    .await?;

    let frontiers_dir = config.data_dir.join("frontiers");
    if frontiers_dir.exists() {
        tokio::fs::remove_dir_all(&frontiers_dir).await?;
    }

    Ok(())
}

/// Deletes every key matching `pattern`. Only ever called at init time
/// under `lock:init`, so `KEYS` (rather than a cursor-based `SCAN`) is an
/// acceptable one-time cost.
async fn delete_matching(conn: &ConnectionManager, pattern: &str) -> Result<()> {
    let keys: Vec<String> = with_retry("keys", || {
        let mut conn = conn.clone();
        let pattern = pattern.to_string();
        async move { conn.keys(&pattern).await }
    })
    .await?;

    for key in keys {
        let _: () = with_retry("delete key", || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move { conn.del(&key).await }
        })
        .await?;
    }
    Ok(())
}

async fn initialize_storage(data_dir: &Path, conn: &ConnectionManager) -> Result<()> {
    tokio::fs::create_dir_all(data_dir.join("frontiers")).await?;
    tokio::fs::create_dir_all(data_dir.join("content")).await?;

    let _: () = with_retry("set schema version", || {
        let mut conn = conn.clone();
        async move { conn.set("crawler:schema_version", SCHEMA_VERSION).await }
    })
    .await?;
    Ok(())
}

async fn load_exclusions(config: &CrawlerConfig, politeness: &PolitenessEnforcer) -> Result<()> {
    let Some(path) = &config.exclude_file else {
        return Ok(());
    };
    let domains = seedfile::read_excluded_domains(path)?;
    for domain in domains {
        politeness.mark_excluded(&domain).await?;
    }
    Ok(())
}

/// Marks every seed URL's domain as seeded, then feeds the seed URLs
/// through `add_urls` at depth 0. Idempotent on resume: already-seen URLs
/// are filtered by the bloom filter and add nothing.
async fn seed_frontier(
    config: &CrawlerConfig,
    politeness: &PolitenessEnforcer,
    frontier: &FrontierManager,
) -> Result<()> {
    let urls = seedfile::read_seed_urls(&config.seed_file)?;

    for url in &urls {
        if let Ok(parsed) = crate::url::normalize_url(url) {
            if let Some(domain) = crate::url::extract_domain(&parsed) {
                politeness.mark_seeded(&domain).await?;
            }
        }
    }

    let batch: Vec<(String, u32)> = urls.into_iter().map(|url| (url, 0)).collect();
    let added = frontier.add_urls(batch).await?;
    tracing::info!(added, "seeded frontier from seed file");
    Ok(())
}

async fn reconcile_all_domains(frontier: &FrontierManager, conn: &ConnectionManager) -> Result<()> {
    let keys: Vec<String> = with_retry("list domain keys", || {
        let mut conn = conn.clone();
        async move { conn.keys("domain:*").await }
    })
    .await?;

    for key in keys {
        if let Some(domain) = key.strip_prefix("domain:") {
            frontier.reconcile_domain(domain).await?;
        }
    }
    Ok(())
}

fn build_child_args(cli: &Cli, role: &str, id: u32) -> Vec<String> {
    let mut args = vec![
        "--seed-file".to_string(),
        cli.seed_file.display().to_string(),
        "--email".to_string(),
        cli.email.clone(),
        "--data-dir".to_string(),
        cli.data_dir.display().to_string(),
        "--num-fetcher-processes".to_string(),
        cli.num_fetcher_processes.to_string(),
        "--num-parser-processes".to_string(),
        cli.num_parser_processes.to_string(),
        "--fetcher-workers".to_string(),
        cli.fetcher_workers.to_string(),
        "--parser-workers".to_string(),
        cli.parser_workers.to_string(),
        "--redis-host".to_string(),
        cli.redis_host.clone(),
        "--redis-port".to_string(),
        cli.redis_port.to_string(),
        "--redis-db".to_string(),
        cli.redis_db.to_string(),
        "--log-level".to_string(),
        cli.log_level.clone(),
        "--resume".to_string(),
        "--internal-role".to_string(),
        role.to_string(),
        "--internal-id".to_string(),
        id.to_string(),
    ];

    if let Some(exclude_file) = &cli.exclude_file {
        args.push("--exclude-file".to_string());
        args.push(exclude_file.display().to_string());
    }
    if let Some(max_pages) = cli.max_pages {
        args.push("--max-pages".to_string());
        args.push(max_pages.to_string());
    }
    if let Some(max_duration) = cli.max_duration {
        args.push("--max-duration".to_string());
        args.push(max_duration.to_string());
    }
    if cli.seeded_urls_only {
        args.push("--seeded-urls-only".to_string());
    }
    if let Some(password) = &cli.redis_password {
        args.push("--redis-password".to_string());
        args.push(password.clone());
    }

    args
}

fn spawn_one(exe: &Path, args: &[String]) -> std::io::Result<Child> {
    Command::new(exe).args(args).stdin(Stdio::null()).spawn()
}

struct SupervisedChild {
    role: &'static str,
    id: u32,
    child: Child,
}

fn spawn_children(cli: &Cli, config: &CrawlerConfig) -> Result<Vec<SupervisedChild>> {
    let exe = std::env::current_exe()?;
    let mut children = Vec::new();

    for id in 1..config.num_fetcher_processes {
        let args = build_child_args(cli, "fetcher", id);
        let child = spawn_one(&exe, &args)?;
        children.push(SupervisedChild { role: "fetcher", id, child });
    }

    for id in 0..config.num_parser_processes {
        let args = build_child_args(cli, "parser", id);
        let child = spawn_one(&exe, &args)?;
        children.push(SupervisedChild { role: "parser", id, child });
    }

    Ok(children)
}

async fn supervise(
    cli: &Cli,
    config: &CrawlerConfig,
    text_conn: &ConnectionManager,
    bytes_conn: &ConnectionManager,
    children: &mut Vec<SupervisedChild>,
    shutdown: &ShutdownFlag,
    metrics: &Metrics,
) {
    let started_at = Instant::now();
    let mut consecutive_empty_checks = 0u32;
    let exe = std::env::current_exe().ok();

    loop {
        tokio::time::sleep(SUPERVISION_INTERVAL).await;

        if shutdown.is_set() {
            break;
        }

        let mut i = 0;
        while i < children.len() {
            let exited = children[i].child.try_wait();
            match exited {
                Ok(Some(status)) => {
                    let role = children[i].role;
                    let id = children[i].id;
                    tracing::warn!(role, id, code = ?status.code(), "child process exited");

                    if role == "parser" {
                        if let Some(exe) = &exe {
                            let args = build_child_args(cli, role, id);
                            match spawn_one(exe, &args) {
                                Ok(new_child) => {
                                    children[i].child = new_child;
                                    tracing::info!(role, id, "restarted parser");
                                }
                                Err(e) => {
                                    tracing::error!(role, id, error = %e, "failed to restart parser");
                                }
                            }
                        }
                        i += 1;
                    } else {
                        children.remove(i);
                    }
                }
                Ok(None) => i += 1,
                Err(e) => {
                    tracing::error!(error = %e, "failed to poll child process status");
                    i += 1;
                }
            }
        }

        let any_fetchers_left = children.iter().any(|c| c.role == "fetcher");
        if config.num_fetcher_processes > 1 && !any_fetchers_left {
            tracing::error!("every spawned fetcher process has died, shutting down");
            shutdown.set();
            break;
        }

        if let Some(max_pages) = config.max_pages {
            if pages_crawled(text_conn).await.unwrap_or(0) >= max_pages {
                tracing::info!(max_pages, "max_pages reached, shutting down");
                shutdown.set();
                break;
            }
        }

        if let Some(max_duration) = config.max_duration_secs {
            if started_at.elapsed() >= Duration::from_secs(max_duration) {
                tracing::info!("max_duration reached, shutting down");
                shutdown.set();
                break;
            }
        }

        match sample_queue_depths(config, text_conn, bytes_conn, metrics).await {
            Ok(true) => {
                consecutive_empty_checks += 1;
                if consecutive_empty_checks >= CONSECUTIVE_EMPTY_CHECKS_TO_STOP {
                    tracing::info!("frontier and fetch queue drained, shutting down");
                    shutdown.set();
                    break;
                }
            }
            Ok(false) => consecutive_empty_checks = 0,
            Err(_) => consecutive_empty_checks = 0,
        }

        if let Err(e) = metrics.flush("orchestrator", std::process::id()) {
            tracing::warn!(error = %e, "failed to flush metrics");
        }
    }
}

async fn pages_crawled(conn: &ConnectionManager) -> Result<u64> {
    let value: Option<i64> = with_retry("get pages_crawled", || {
        let mut conn = conn.clone();
        async move { conn.get(redis_keys::pages_crawled()).await }
    })
    .await?;
    Ok(value.unwrap_or(0).max(0) as u64)
}

/// Sums per-shard domain-queue and fetch-queue lengths, publishing both as
/// gauges along the way, and reports whether the whole pipeline is drained.
async fn sample_queue_depths(
    config: &CrawlerConfig,
    text_conn: &ConnectionManager,
    bytes_conn: &ConnectionManager,
    metrics: &Metrics,
) -> Result<bool> {
    let mut frontier_total: i64 = 0;
    for shard in 0..u64::from(config.num_fetcher_processes) {
        let key = redis_keys::domain_queue(shard);
        let len: i64 = with_retry("llen shard queue", || {
            let mut conn = text_conn.clone();
            let key = key.clone();
            async move { conn.llen(&key).await }
        })
        .await?;
        frontier_total += len;
    }
    metrics.frontier_size.set(frontier_total);

    let fetch_len: i64 = with_retry("llen fetch:queue", || {
        let mut conn = bytes_conn.clone();
        async move { conn.llen(redis_keys::fetch_queue()).await }
    })
    .await?;
    metrics.fetch_queue_depth.set(fetch_len);

    Ok(frontier_total == 0 && fetch_len == 0)
}

async fn terminate_children(children: &mut [SupervisedChild]) {
    for supervised in children.iter_mut() {
        if let Some(pid) = supervised.child.id() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
        }

        let wait = tokio::time::timeout(CHILD_SHUTDOWN_GRACE, supervised.child.wait()).await;
        if wait.is_err() {
            tracing::warn!(role = supervised.role, id = supervised.id, "child did not exit in time, killing");
            let _ = supervised.child.kill().await;
        }
    }
}

//! Fetcher process: `W_f` concurrent workers draining one frontier shard.
//!
//! [`FetcherProcess`] is constructed identically whether it ends up running
//! as its own OS process or, for shard 0, as a task embedded in the
//! orchestrator (the leader model) — it owns no process-global state itself.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use reqwest::Client;

use crate::config::{BackpressureConfig, CrawlerConfig};
use crate::fetch::{self, FetchOutcome};
use crate::frontier::FrontierManager;
use crate::metrics::Metrics;
use crate::process::shutdown::ShutdownFlag;
use crate::record::FetchQueueRecord;
use crate::redis_client::with_retry;
use crate::redis_keys;
use crate::visited::{record_visited, VisitedRecord};

const EMPTY_FRONTIER_SLEEP: Duration = Duration::from_secs(10);
const FRONTIER_ERROR_SLEEP: Duration = Duration::from_secs(10);
const STARTUP_BATCH_SIZE: u32 = 100;
const STARTUP_BATCH_DELAY: Duration = Duration::from_secs(5);
const HARD_BACKPRESSURE_POLL: Duration = Duration::from_millis(500);

pub struct FetcherProcess {
    pub id: u64,
    worker_count: u32,
    backpressure: BackpressureConfig,
    frontier: Arc<FrontierManager>,
    bytes_conn: ConnectionManager,
    text_conn: ConnectionManager,
    http_client: Client,
    metrics: Arc<Metrics>,
    shutdown: ShutdownFlag,
}

impl FetcherProcess {
    pub fn new(
        id: u64,
        config: &CrawlerConfig,
        frontier: Arc<FrontierManager>,
        bytes_conn: ConnectionManager,
        text_conn: ConnectionManager,
        http_client: Client,
        metrics: Arc<Metrics>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            id,
            worker_count: config.fetcher_workers,
            backpressure: config.backpressure,
            frontier,
            bytes_conn,
            text_conn,
            http_client,
            metrics,
            shutdown,
        }
    }

    /// Launches every worker in batches of 100, 5 s apart, and returns once
    /// every worker has exited (which happens after `shutdown` is set).
    pub async fn run(self: Arc<Self>) {
        let mut handles = Vec::with_capacity(self.worker_count as usize);

        let mut batch_start = 0;
        while batch_start < self.worker_count {
            let batch_end = (batch_start + STARTUP_BATCH_SIZE).min(self.worker_count);
            for worker_id in batch_start..batch_end {
                let this = Arc::clone(&self);
                handles.push(tokio::spawn(async move { this.worker_loop(worker_id).await }));
            }
            batch_start = batch_end;
            if batch_start < self.worker_count && !self.shutdown.is_set() {
                tokio::time::sleep(STARTUP_BATCH_DELAY).await;
            }
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(&self, worker_id: u32) {
        let jitter = Duration::from_millis(u64::from(worker_id % 100) * 50);
        tokio::time::sleep(jitter).await;

        while !self.shutdown.is_set() {
            match self.frontier.get_next_url(self.id).await {
                Ok(Some((url, domain, depth))) => {
                    self.fetch_and_route(&url, &domain, depth).await;
                }
                Ok(None) => {
                    tracing::debug!(fetcher = self.id, worker = worker_id, "frontier empty");
                    tokio::time::sleep(EMPTY_FRONTIER_SLEEP).await;
                }
                Err(e) => {
                    tracing::error!(fetcher = self.id, worker = worker_id, error = %e, "frontier error");
                    tokio::time::sleep(FRONTIER_ERROR_SLEEP).await;
                }
            }
        }
    }

    async fn fetch_and_route(&self, url: &str, domain: &str, depth: u32) {
        let outcome = fetch::fetch_url(&self.http_client, url).await;
        let crawled_at = now();

        match outcome {
            FetchOutcome::Error { class, status } => {
                self.metrics
                    .errors_by_class
                    .with_label_values(&[class.as_str()])
                    .inc();
                self.increment_pages_crawled().await;
                self.write_visited(url, status.unwrap_or(0), "", crawled_at, None)
                    .await;
            }
            FetchOutcome::NonHtml {
                final_url,
                status_code,
                content_type,
            } => {
                self.increment_pages_crawled().await;
                let redirected_to = if final_url != url { Some(final_url.as_str()) } else { None };
                self.write_visited(url, status_code, &content_type, crawled_at, redirected_to)
                    .await;
            }
            FetchOutcome::Html {
                final_url,
                status_code,
                content_type,
                body,
            } => {
                self.metrics.pages_fetched.inc();
                self.increment_pages_crawled().await;
                let record = FetchQueueRecord::new(
                    final_url,
                    url.to_string(),
                    domain.to_string(),
                    depth,
                    status_code,
                    content_type,
                    crawled_at,
                    body,
                );
                if let Err(e) = self.push_fetch_queue(&record).await {
                    tracing::error!(url, error = %e, "failed to push fetch-queue record");
                    return;
                }
                self.apply_backpressure().await;
            }
        }
    }

    async fn write_visited(
        &self,
        url: &str,
        status_code: u16,
        content_type: &str,
        crawled_at: i64,
        redirected_to: Option<&str>,
    ) {
        let record = VisitedRecord {
            url,
            status_code,
            content_type,
            content_path: "",
            crawled_at,
            redirected_to,
        };
        if let Err(e) = record_visited(&self.text_conn, record).await {
            tracing::warn!(url, error = %e, "failed to record visited entry");
        }
    }

    async fn increment_pages_crawled(&self) {
        let result: Result<i64, _> = with_retry("incr pages_crawled", || {
            let mut conn = self.text_conn.clone();
            async move { conn.incr(redis_keys::pages_crawled(), 1).await }
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to increment pages_crawled counter");
        }
    }

    async fn push_fetch_queue(&self, record: &FetchQueueRecord) -> Result<(), crate::CrawlError> {
        let bytes = record.encode()?;
        let _: () = with_retry("push fetch:queue", || {
            let mut conn = self.bytes_conn.clone();
            let bytes = bytes.clone();
            async move { conn.rpush(redis_keys::fetch_queue(), bytes).await }
        })
        .await?;
        Ok(())
    }

    async fn fetch_queue_depth(&self) -> Result<i64, crate::RedisOpError> {
        with_retry("fetch:queue length", || {
            let mut conn = self.bytes_conn.clone();
            async move { conn.llen(redis_keys::fetch_queue()).await }
        })
        .await
    }

    /// Soft backpressure sleeps proportionally to how far over the soft
    /// threshold the queue is; hard backpressure blocks until the queue
    /// drains back under the soft threshold.
    async fn apply_backpressure(&self) {
        let Ok(depth) = self.fetch_queue_depth().await else {
            return;
        };

        if depth as u64 > self.backpressure.hard_threshold {
            self.metrics.backpressure_events.inc();
            tracing::warn!(depth, "hard backpressure: blocking until queue drains");
            loop {
                tokio::time::sleep(HARD_BACKPRESSURE_POLL).await;
                match self.fetch_queue_depth().await {
                    Ok(d) if (d as u64) < self.backpressure.soft_threshold => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
            return;
        }

        if depth as u64 > self.backpressure.soft_threshold {
            self.metrics.backpressure_events.inc();
            let over = (depth as u64 - self.backpressure.soft_threshold) as f64;
            let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
            let sleep_secs = 2.0 * over / 60_000.0 + jitter;
            tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
        }
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

//! Parser consumer: `W_p` concurrent workers draining `fetch:queue`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::config::CrawlerConfig;
use crate::frontier::FrontierManager;
use crate::metrics::Metrics;
use crate::parse::{self, FailureCounter};
use crate::process::shutdown::ShutdownFlag;
use crate::record::FetchQueueRecord;
use crate::redis_client::with_retry;
use crate::redis_keys;
use crate::visited::{record_visited, VisitedRecord};

const BLPOP_TIMEOUT_SECS: usize = 5;

pub struct ParserConsumer {
    pub id: u32,
    worker_count: u32,
    data_dir: PathBuf,
    frontier: Arc<FrontierManager>,
    bytes_conn: ConnectionManager,
    text_conn: ConnectionManager,
    metrics: Arc<Metrics>,
    shutdown: ShutdownFlag,
    failures: Arc<FailureCounter>,
}

impl ParserConsumer {
    pub fn new(
        id: u32,
        config: &CrawlerConfig,
        frontier: Arc<FrontierManager>,
        bytes_conn: ConnectionManager,
        text_conn: ConnectionManager,
        metrics: Arc<Metrics>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            id,
            worker_count: config.parser_workers,
            data_dir: config.data_dir.clone(),
            frontier,
            bytes_conn,
            text_conn,
            metrics,
            shutdown,
            failures: Arc::new(FailureCounter::new()),
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut handles = Vec::with_capacity(self.worker_count as usize);
        for worker_id in 0..self.worker_count {
            let this = Arc::clone(&self);
            handles.push(tokio::spawn(async move { this.worker_loop(worker_id).await }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(&self, worker_id: u32) {
        while !self.shutdown.is_set() {
            match self.pop_one().await {
                Ok(Some(bytes)) => self.process_item(bytes).await,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(parser = self.id, worker = worker_id, error = %e, "fetch:queue pop failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn pop_one(&self) -> Result<Option<Vec<u8>>, crate::RedisOpError> {
        let result: Option<(String, Vec<u8>)> = with_retry("blpop fetch:queue", || {
            let mut conn = self.bytes_conn.clone();
            async move {
                conn.blpop(redis_keys::fetch_queue(), BLPOP_TIMEOUT_SECS as f64)
                    .await
            }
        })
        .await?;
        Ok(result.map(|(_, bytes)| bytes))
    }

    async fn process_item(&self, bytes: Vec<u8>) {
        let record = match FetchQueueRecord::decode(&bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, "undecodable fetch-queue record, dropping");
                self.metrics.parse_drops.inc();
                return;
            }
        };

        if let Err(e) = self.parse_and_persist(&record).await {
            tracing::warn!(url = %record.url, error = %e, "parse failure");
            self.metrics.parse_failures.inc();

            if self.failures.record_failure(&record.url) {
                self.metrics.parse_drops.inc();
                tracing::error!(url = %record.url, "dropping item after repeated parse failures");
                return;
            }

            if let Err(e) = self.requeue(&bytes).await {
                tracing::error!(url = %record.url, error = %e, "failed to requeue item after parse failure");
            }
            return;
        }

        self.failures.clear(&record.url);
    }

    async fn parse_and_persist(&self, record: &FetchQueueRecord) -> Result<(), crate::CrawlError> {
        let final_url = url::Url::parse(&record.url).map_err(|e| {
            crate::CrawlError::Fatal(format!("unparseable final URL '{}': {e}", record.url))
        })?;
        let html = String::from_utf8_lossy(&record.html);
        let parsed = parse::parse_html(&html, &final_url);

        let content_path = parse::content_path(&self.data_dir, &record.url);
        parse::write_content_atomically(&content_path, &parsed.text).await?;

        let visited_record = VisitedRecord {
            url: &record.url,
            status_code: record.status_code,
            content_type: &record.content_type,
            content_path: &content_path.display().to_string(),
            crawled_at: record.fetched_at,
            redirected_to: if record.is_redirect {
                Some(record.url.as_str())
            } else {
                None
            },
        };
        record_visited(&self.text_conn, visited_record).await?;

        let batch: Vec<(String, u32)> = parsed
            .links
            .into_iter()
            .map(|link| (link, record.depth + 1))
            .collect();
        self.frontier.add_urls(batch).await?;

        Ok(())
    }

    async fn requeue(&self, bytes: &[u8]) -> Result<(), crate::RedisOpError> {
        with_retry("requeue fetch:queue item", || {
            let mut conn = self.bytes_conn.clone();
            let bytes = bytes.to_vec();
            async move { conn.rpush(redis_keys::fetch_queue(), bytes).await }
        })
        .await
    }
}

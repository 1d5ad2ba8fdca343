//! The Frontier Manager: per-domain append-only files plus Redis-backed
//! shard queues, with at-most-one-worker-per-domain semantics inside one
//! process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};

use crate::config::DOMAIN_MUTEX_SHARDS;
use crate::frontier::mutex_table::DomainMutexTable;
use crate::frontier::shard::{directory_bucket, shard_for};
use crate::politeness::PolitenessEnforcer;
use crate::redis_client::with_retry;
use crate::redis_keys;
use crate::url::{extract_domain, normalize_url};
use crate::{bloom, FrontierError};

pub struct FrontierManager {
    conn: ConnectionManager,
    data_dir: PathBuf,
    mutex_table: DomainMutexTable,
    politeness: Arc<PolitenessEnforcer>,
    shard_count: AtomicU64,
}

impl FrontierManager {
    pub fn new(
        conn: ConnectionManager,
        data_dir: PathBuf,
        politeness: Arc<PolitenessEnforcer>,
        shard_count: u64,
    ) -> Self {
        Self {
            conn,
            data_dir,
            mutex_table: DomainMutexTable::new(DOMAIN_MUTEX_SHARDS),
            politeness,
            shard_count: AtomicU64::new(shard_count.max(1)),
        }
    }

    pub fn set_shard_count(&self, shard_count: u64) {
        self.shard_count.store(shard_count.max(1), Ordering::SeqCst);
    }

    fn shard_count(&self) -> u64 {
        self.shard_count.load(Ordering::SeqCst)
    }

    fn frontier_path(&self, domain: &str) -> PathBuf {
        self.data_dir
            .join("frontiers")
            .join(directory_bucket(domain))
            .join(format!("{domain}.frontier"))
    }

    /// Normalizes, filters, dedups, and appends each `(url, depth)` pair.
    /// Returns the number of URLs actually appended.
    pub async fn add_urls(
        &self,
        batch: impl IntoIterator<Item = (String, u32)>,
    ) -> Result<usize, FrontierError> {
        let mut by_domain: std::collections::HashMap<String, Vec<(String, u32)>> =
            std::collections::HashMap::new();

        for (url_str, depth) in batch {
            let Ok(url) = normalize_url(&url_str) else {
                continue;
            };
            let Some(domain) = extract_domain(&url) else {
                continue;
            };

            if !self
                .politeness
                .is_domain_admissible(&domain)
                .await
                .map_err(FrontierError::from)?
            {
                continue;
            }

            let normalized = url.to_string();

            if bloom::might_contain(&self.conn, &normalized).await? {
                continue;
            }

            if !self
                .politeness
                .is_url_allowed(&url)
                .await
                .map_err(FrontierError::from)?
            {
                bloom::add(&self.conn, &normalized).await?;
                continue;
            }

            bloom::add(&self.conn, &normalized).await?;
            by_domain.entry(domain).or_default().push((normalized, depth));
        }

        let mut appended = 0;
        for (domain, urls) in by_domain {
            appended += self.append_domain_batch(&domain, &urls).await?;
        }
        Ok(appended)
    }

    async fn append_domain_batch(
        &self,
        domain: &str,
        urls: &[(String, u32)],
    ) -> Result<usize, FrontierError> {
        let _guard = self.mutex_table.lock(domain).await;

        let path = self.frontier_path(domain);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(&path, e))?;
        }

        let mut payload = String::new();
        for (url, depth) in urls {
            payload.push_str(url);
            payload.push('|');
            payload.push_str(&depth.to_string());
            payload.push('\n');
        }
        let bytes_appended = payload.len() as i64;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_err(&path, e))?;
        file.write_all(payload.as_bytes())
            .await
            .map_err(|e| io_err(&path, e))?;
        file.flush().await.map_err(|e| io_err(&path, e))?;

        let domain_key = redis_keys::domain(domain);
        let (prior_offset, prior_size): (i64, i64) = with_retry("frontier hget sizes", || {
            let mut conn = self.conn.clone();
            let domain_key = domain_key.clone();
            async move {
                let values: (Option<i64>, Option<i64>) = redis::pipe()
                    .hget(&domain_key, "frontier_offset")
                    .hget(&domain_key, "frontier_size")
                    .query_async(&mut conn)
                    .await?;
                Ok((values.0.unwrap_or(0), values.1.unwrap_or(0)))
            }
        })
        .await?;

        let new_size = prior_size + bytes_appended;
        let _: () = with_retry("frontier hset size", || {
            let mut conn = self.conn.clone();
            let domain_key = domain_key.clone();
            async move { conn.hset(&domain_key, "frontier_size", new_size).await }
        })
        .await?;

        if prior_size == prior_offset {
            let shard = shard_for(domain, self.shard_count());
            let queue_key = redis_keys::domain_queue(shard);
            let _: () = with_retry("frontier enqueue domain", || {
                let mut conn = self.conn.clone();
                let queue_key = queue_key.clone();
                let domain = domain.to_string();
                async move { conn.rpush(&queue_key, domain).await }
            })
            .await?;
        }

        Ok(urls.len())
    }

    /// Selects one URL from `fetcher_id`'s shard that politeness permits
    /// right now. Returns `None` when nothing is currently fetchable.
    pub async fn get_next_url(
        &self,
        fetcher_id: u64,
    ) -> Result<Option<(String, String, u32)>, FrontierError> {
        if fetcher_id >= self.shard_count() {
            return Ok(None);
        }

        let queue_key = redis_keys::domain_queue(fetcher_id);
        let domain: Option<String> = with_retry("frontier pop domain", || {
            let mut conn = self.conn.clone();
            let queue_key = queue_key.clone();
            async move { conn.lpop(&queue_key, None).await }
        })
        .await?;

        let Some(domain) = domain else {
            return Ok(None);
        };

        let _guard = self.mutex_table.lock(&domain).await;

        if !self
            .politeness
            .can_fetch_domain_now(&domain)
            .await
            .map_err(FrontierError::from)?
        {
            let _: () = with_retry("frontier requeue domain", || {
                let mut conn = self.conn.clone();
                let queue_key = queue_key.clone();
                let domain = domain.clone();
                async move { conn.rpush(&queue_key, domain).await }
            })
            .await?;
            return Ok(None);
        }

        loop {
            let domain_key = redis_keys::domain(&domain);
            let (offset, size): (i64, i64) = with_retry("frontier hget offset/size", || {
                let mut conn = self.conn.clone();
                let domain_key = domain_key.clone();
                async move {
                    let values: (Option<i64>, Option<i64>) = redis::pipe()
                        .hget(&domain_key, "frontier_offset")
                        .hget(&domain_key, "frontier_size")
                        .query_async(&mut conn)
                        .await?;
                    Ok((values.0.unwrap_or(0), values.1.unwrap_or(0)))
                }
            })
            .await?;

            if offset >= size {
                return Ok(None);
            }

            let path = self.frontier_path(&domain);
            let (line, new_offset) = read_line_at(&path, offset)
                .await
                .map_err(|e| io_err(&path, e))?;

            let _: () = with_retry("frontier advance offset", || {
                let mut conn = self.conn.clone();
                let domain_key = domain_key.clone();
                async move { conn.hset(&domain_key, "frontier_offset", new_offset).await }
            })
            .await?;

            let Some((url, depth)) = parse_frontier_line(&line) else {
                continue;
            };

            let parsed_url = match crate::url::normalize_url(&url) {
                Ok(u) => u,
                Err(_) => continue,
            };

            if !self
                .politeness
                .is_url_allowed(&parsed_url)
                .await
                .map_err(FrontierError::from)?
            {
                continue;
            }

            self.politeness
                .record_domain_fetch_attempt(&domain)
                .await
                .map_err(FrontierError::from)?;

            let _: () = with_retry("frontier reenqueue domain", || {
                let mut conn = self.conn.clone();
                let queue_key = queue_key.clone();
                let domain = domain.clone();
                async move { conn.rpush(&queue_key, domain).await }
            })
            .await?;

            return Ok(Some((url, domain, depth)));
        }
    }

    /// For resumed runs: bumps `frontier_size` to match the file's actual
    /// length and enqueues the domain, recovering from a crash between a
    /// durable append and the Redis size update that should have followed
    /// it.
    pub async fn reconcile_domain(&self, domain: &str) -> Result<(), FrontierError> {
        let path = self.frontier_path(domain);
        let actual_size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len() as i64,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_err(&path, e)),
        };

        let domain_key = redis_keys::domain(domain);
        let (offset, size): (i64, i64) = with_retry("reconcile hget", || {
            let mut conn = self.conn.clone();
            let domain_key = domain_key.clone();
            async move {
                let values: (Option<i64>, Option<i64>) = redis::pipe()
                    .hget(&domain_key, "frontier_offset")
                    .hget(&domain_key, "frontier_size")
                    .query_async(&mut conn)
                    .await?;
                Ok((values.0.unwrap_or(0), values.1.unwrap_or(0)))
            }
        })
        .await?;

        if size >= actual_size {
            return Ok(());
        }

        let _: () = with_retry("reconcile hset size", || {
            let mut conn = self.conn.clone();
            let domain_key = domain_key.clone();
            async move { conn.hset(&domain_key, "frontier_size", actual_size).await }
        })
        .await?;

        if offset == size {
            let shard = shard_for(domain, self.shard_count());
            let queue_key = redis_keys::domain_queue(shard);
            let _: () = with_retry("reconcile enqueue", || {
                let mut conn = self.conn.clone();
                let queue_key = queue_key.clone();
                let domain = domain.to_string();
                async move { conn.rpush(&queue_key, domain).await }
            })
            .await?;
        }

        Ok(())
    }
}

fn parse_frontier_line(line: &str) -> Option<(String, u32)> {
    let (url, depth) = line.trim_end_matches('\n').rsplit_once('|')?;
    let depth: u32 = depth.parse().ok()?;
    Some((url.to_string(), depth))
}

/// Seeks to `offset` and reads one `url|depth\n` line, returning it along
/// with the byte offset just past the line (including the newline).
async fn read_line_at(path: &Path, offset: i64) -> std::io::Result<(String, i64)> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset as u64)).await?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    Ok((line, offset + bytes_read as i64))
}

fn io_err(path: &Path, source: std::io::Error) -> FrontierError {
    FrontierError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_frontier_line() {
        let parsed = parse_frontier_line("https://example.com/page|3\n");
        assert_eq!(
            parsed,
            Some(("https://example.com/page".to_string(), 3))
        );
    }

    #[test]
    fn rejects_a_line_with_no_depth_separator() {
        assert_eq!(parse_frontier_line("https://example.com/page\n"), None);
    }

    #[test]
    fn rejects_a_non_numeric_depth() {
        assert_eq!(parse_frontier_line("https://example.com/page|abc\n"), None);
    }
}

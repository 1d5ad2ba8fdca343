//! The Politeness Enforcer: manual exclusions, seeded-only mode,
//! robots.txt acquisition/caching, and crawl-delay scheduling.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use reqwest::Client;
use url::Url;

use crate::config::{UserAgentConfig, DEFAULT_CRAWL_DELAY_SECS, ROBOTS_TTL_SECS};
use crate::redis_client::with_retry;
use crate::redis_keys;
use crate::robots::{self, ParsedRobots, RobotsCache};
use crate::PolitenessError;

/// Crawl-delay used only to gate the robots.txt fetch itself; a robots
/// fetch still counts as domain activity but shouldn't wait the full
/// (possibly 70s) crawl delay before the crawler has even learned the
/// domain's real delay.
const ROBOTS_FETCH_IMPLICIT_DELAY_SECS: u64 = 1;

pub struct PolitenessEnforcer {
    conn: ConnectionManager,
    http_client: Client,
    user_agent: UserAgentConfig,
    default_crawl_delay_secs: u64,
    seeded_urls_only: bool,
    robots_cache: Mutex<RobotsCache>,
}

impl PolitenessEnforcer {
    pub fn new(
        conn: ConnectionManager,
        http_client: Client,
        user_agent: UserAgentConfig,
        seeded_urls_only: bool,
    ) -> Self {
        Self {
            conn,
            http_client,
            user_agent,
            default_crawl_delay_secs: DEFAULT_CRAWL_DELAY_SECS,
            seeded_urls_only,
            robots_cache: Mutex::new(RobotsCache::new()),
        }
    }

    /// Manual exclusions, then seeded-only mode, then robots.txt.
    pub async fn is_url_allowed(&self, url: &Url) -> Result<bool, PolitenessError> {
        let Some(domain) = url.host_str().map(str::to_lowercase) else {
            return Ok(false);
        };

        if self.is_excluded(&domain).await? {
            return Ok(false);
        }

        if self.seeded_urls_only && !self.is_seeded(&domain).await? {
            return Ok(false);
        }

        let robots = self.ensure_robots_fresh(&domain).await?;
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        Ok(robots.is_allowed(&path, self.user_agent.robots_token()))
    }

    /// Manual exclusions and seeded-only mode only, without touching
    /// robots.txt — used by `add_urls` (§4.1 step 2), which checks this
    /// before the bloom filter and defers the robots check to step 4.
    pub async fn is_domain_admissible(&self, domain: &str) -> Result<bool, PolitenessError> {
        if self.is_excluded(domain).await? {
            return Ok(false);
        }
        if self.seeded_urls_only && !self.is_seeded(domain).await? {
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn can_fetch_domain_now(&self, domain: &str) -> Result<bool, PolitenessError> {
        let next_fetch_time: Option<i64> = self.hget(domain, "next_fetch_time").await?;
        Ok(next_fetch_time.unwrap_or(0) <= now())
    }

    /// Advances `next_fetch_time` by this domain's crawl delay.
    pub async fn record_domain_fetch_attempt(&self, domain: &str) -> Result<(), PolitenessError> {
        let delay = self.get_crawl_delay(domain).await?;
        self.hset(domain, "next_fetch_time", now() + delay as i64)
            .await
    }

    /// `max(configured floor, robots Crawl-delay)`.
    pub async fn get_crawl_delay(&self, domain: &str) -> Result<u64, PolitenessError> {
        let robots = self.ensure_robots_fresh(domain).await?;
        let robots_delay = robots
            .crawl_delay(self.user_agent.robots_token())
            .map(|secs| secs.ceil() as u64)
            .unwrap_or(0);
        Ok(self.default_crawl_delay_secs.max(robots_delay))
    }

    /// Marks `domain` as manually excluded (init-time only).
    pub async fn mark_excluded(&self, domain: &str) -> Result<(), PolitenessError> {
        self.hset(domain, "is_excluded", 1).await
    }

    /// Marks `domain` as present in the seed file (init-time only).
    pub async fn mark_seeded(&self, domain: &str) -> Result<(), PolitenessError> {
        self.hset(domain, "is_seeded", 1).await
    }

    async fn is_excluded(&self, domain: &str) -> Result<bool, PolitenessError> {
        let value: Option<i64> = self.hget(domain, "is_excluded").await?;
        Ok(value == Some(1))
    }

    async fn is_seeded(&self, domain: &str) -> Result<bool, PolitenessError> {
        let value: Option<i64> = self.hget(domain, "is_seeded").await?;
        Ok(value == Some(1))
    }

    /// Reads the cached robots.txt for `domain`, refetching if expired or
    /// absent. The fetch itself is gated by a short implicit delay so it
    /// counts as domain activity without waiting the domain's full crawl
    /// delay before we even know what that delay is.
    async fn ensure_robots_fresh(&self, domain: &str) -> Result<ParsedRobots, PolitenessError> {
        let expires: Option<i64> = self.hget(domain, "robots_expires").await?;
        let content: Option<String> = self.hget(domain, "robots_content").await?;

        if let (Some(expires), Some(content)) = (expires, &content) {
            if expires > now() {
                return Ok(self.robots_cache.lock().unwrap().get_or_parse(content));
            }
        }

        if !self.gate_robots_fetch(domain).await? {
            // Another worker is already refreshing this domain's robots.txt
            // right now; fall back to whatever is cached (possibly stale,
            // possibly absent) rather than blocking.
            return Ok(self
                .robots_cache
                .lock()
                .unwrap()
                .get_or_parse(content.as_deref().unwrap_or("")));
        }

        let fetched = robots::fetch_robots_content(&self.http_client, domain).await;
        self.hset(domain, "robots_content", fetched.clone()).await?;
        self.hset(domain, "robots_expires", now() + ROBOTS_TTL_SECS)
            .await?;

        Ok(self.robots_cache.lock().unwrap().get_or_parse(&fetched))
    }

    /// True if the robots-fetch's own short delay has elapsed, advancing it
    /// as a side effect (mirrors `record_domain_fetch_attempt` but with the
    /// shorter implicit delay, never the real crawl delay).
    async fn gate_robots_fetch(&self, domain: &str) -> Result<bool, PolitenessError> {
        let next_fetch_time: Option<i64> = self.hget(domain, "next_fetch_time").await?;
        if next_fetch_time.unwrap_or(0) > now() {
            return Ok(false);
        }
        self.hset(
            domain,
            "next_fetch_time",
            now() + ROBOTS_FETCH_IMPLICIT_DELAY_SECS as i64,
        )
        .await?;
        Ok(true)
    }

    async fn hget<T: redis::FromRedisValue>(
        &self,
        domain: &str,
        field: &'static str,
    ) -> Result<Option<T>, PolitenessError> {
        let key = redis_keys::domain(domain);
        with_retry("politeness hget", || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            async move { conn.hget(&key, field).await }
        })
        .await
        .map_err(PolitenessError::Redis)
    }

    async fn hset<T: redis::ToRedisArgs + Send + Sync + Clone + 'static>(
        &self,
        domain: &str,
        field: &'static str,
        value: T,
    ) -> Result<(), PolitenessError> {
        let key = redis_keys::domain(domain);
        with_retry("politeness hset", || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            let value = value.clone();
            async move { conn.hset(&key, field, value).await }
        })
        .await
        .map_err(PolitenessError::Redis)
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_delay_uses_configured_floor_when_no_robots_delay() {
        let default_delay = DEFAULT_CRAWL_DELAY_SECS;
        let robots_delay: Option<f64> = None;
        let effective = default_delay.max(robots_delay.map(|d| d.ceil() as u64).unwrap_or(0));
        assert_eq!(effective, default_delay);
    }

    #[test]
    fn effective_delay_uses_robots_delay_when_larger() {
        let default_delay = DEFAULT_CRAWL_DELAY_SECS;
        let robots_delay: Option<f64> = Some(120.0);
        let effective = default_delay.max(robots_delay.map(|d| d.ceil() as u64).unwrap_or(0));
        assert_eq!(effective, 120);
    }

    #[test]
    fn effective_delay_keeps_floor_when_robots_delay_is_smaller() {
        let default_delay = DEFAULT_CRAWL_DELAY_SECS;
        let robots_delay: Option<f64> = Some(5.0);
        let effective = default_delay.max(robots_delay.map(|d| d.ceil() as u64).unwrap_or(0));
        assert_eq!(effective, default_delay);
    }
}

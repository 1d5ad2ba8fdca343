//! Centralized Redis key naming.
//!
//! Every subsystem that touches Redis goes through these builders instead of
//! formatting key strings inline, so the literal key shapes in one place
//! match across the frontier, politeness enforcer, orchestrator, and
//! fetcher/parser pipeline.

use sha2::{Digest, Sha256};

/// `crawler:shard_count` — current number of fetcher shards.
pub fn shard_count() -> &'static str {
    "crawler:shard_count"
}

/// `lock:<name>` — an init-phase lock with a TTL and unique token.
pub fn lock(name: &str) -> String {
    format!("lock:{name}")
}

/// `seen:bloom` — the URL dedup filter.
pub fn seen_bloom() -> &'static str {
    "seen:bloom"
}

/// `domains:queue:<i>` — shard `i`'s list of ready domains.
pub fn domain_queue(shard: u64) -> String {
    format!("domains:queue:{shard}")
}

/// `domain:<d>` — per-domain metadata hash.
pub fn domain(d: &str) -> String {
    format!("domain:{d}")
}

/// `fetch:queue` — fetched HTML awaiting parse.
pub fn fetch_queue() -> &'static str {
    "fetch:queue"
}

/// `visited:<sha256(url)>` — terminal record for one URL.
pub fn visited(url: &str) -> String {
    format!("visited:{}", hex::encode(Sha256::digest(url.as_bytes())))
}

/// `crawler:pages_crawled` — running total consulted by the orchestrator's
/// `max_pages` stopping condition.
pub fn pages_crawled() -> &'static str {
    "crawler:pages_crawled"
}

/// `crawler:shutdown` — shared shutdown flag children poll between BLPOP
/// timeouts, set by the orchestrator alongside its in-process flag.
pub fn shutdown_flag() -> &'static str {
    "crawler:shutdown"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_queue_formats_shard_index() {
        assert_eq!(domain_queue(3), "domains:queue:3");
    }

    #[test]
    fn domain_key_wraps_the_domain_string() {
        assert_eq!(domain("example.com"), "domain:example.com");
    }

    #[test]
    fn lock_key_wraps_the_lock_name() {
        assert_eq!(lock("init"), "lock:init");
    }

    #[test]
    fn visited_key_is_stable_for_the_same_url() {
        let a = visited("https://example.com/");
        let b = visited("https://example.com/");
        assert_eq!(a, b);
        assert!(a.starts_with("visited:"));
        assert_eq!(a.len(), "visited:".len() + 64);
    }

    #[test]
    fn visited_key_differs_for_different_urls() {
        assert_ne!(
            visited("https://example.com/a"),
            visited("https://example.com/b")
        );
    }

    #[test]
    fn pages_crawled_and_shutdown_flag_are_fixed_keys() {
        assert_eq!(pages_crawled(), "crawler:pages_crawled");
        assert_eq!(shutdown_flag(), "crawler:shutdown");
    }
}

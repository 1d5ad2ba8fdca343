//! politecrawl: a high-throughput, politeness-enforcing web crawler core.
//!
//! The crawler is split into four cooperating subsystems that share state
//! through Redis and the local filesystem rather than direct IPC: a
//! [`frontier`] of per-domain URL files and shard queues, a [`politeness`]
//! enforcer that gates every fetch against robots.txt and crawl delays, a
//! [`process::orchestrator`] that owns one-time initialization and
//! supervises child processes, and a fetch/parse pipeline
//! ([`process::fetcher`], [`parse`]) that turns frontier entries into saved
//! content and new frontier entries.

pub mod bloom;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod frontier;
pub mod metrics;
pub mod parse;
pub mod politeness;
pub mod process;
pub mod record;
pub mod redis_client;
pub mod redis_keys;
pub mod robots;
pub mod seedfile;
pub mod shard_lock;
pub mod url;
pub mod visited;

use thiserror::Error;

/// Top-level error type for politecrawl operations.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("frontier error: {0}")]
    Frontier(#[from] FrontierError),

    #[error("politeness error: {0}")]
    Politeness(#[from] PolitenessError),

    #[error("redis error: {0}")]
    Redis(#[from] RedisOpError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("{0}")]
    Fatal(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// URL-specific errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("failed to parse URL: {0}")]
    Parse(String),

    #[error("invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("missing domain in URL")]
    MissingDomain,

    #[error("host has no public suffix: {0}")]
    NoPublicSuffix(String),

    #[error("malformed URL: {0}")]
    Malformed(String),
}

/// Frontier-specific errors.
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("io error on frontier file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("redis error: {0}")]
    Redis(#[from] RedisOpError),

    #[error("politeness error: {0}")]
    Politeness(#[from] PolitenessError),

    #[error("shard {shard} out of range for shard_count {shard_count}")]
    ShardOutOfRange { shard: u64, shard_count: u64 },
}

/// Politeness-enforcer errors.
#[derive(Debug, Error)]
pub enum PolitenessError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisOpError),
}

/// Redis operation errors, after the bounded retry policy has been exhausted.
#[derive(Debug, Error)]
pub enum RedisOpError {
    #[error("redis command failed after retries: {0}")]
    Command(#[from] redis::RedisError),

    #[error("redis connection pool exhausted or unavailable: {0}")]
    PoolUnavailable(String),
}

/// Result alias for top-level crawler operations.
pub type Result<T> = std::result::Result<T, CrawlError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type UrlResult<T> = std::result::Result<T, UrlError>;
pub type FrontierResult<T> = std::result::Result<T, FrontierError>;
pub type PolitenessResult<T> = std::result::Result<T, PolitenessError>;
pub type RedisOpResult<T> = std::result::Result<T, RedisOpError>;

pub use config::CrawlerConfig;
pub use url::{extract_domain, normalize_url};

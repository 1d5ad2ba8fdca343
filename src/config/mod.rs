//! Runtime configuration.
//!
//! There is no config file: the command line (§6 of the external
//! interface) is the only input, validated once by the orchestrator before
//! any process (including the orchestrator's own embedded fetcher 0) starts
//! touching Redis or the filesystem.

mod types;
mod validation;

pub use types::{
    BackpressureConfig, CrawlerConfig, RedisConfig, UserAgentConfig, DEFAULT_CRAWL_DELAY_SECS,
    DIRECTORY_BUCKETS, DOMAIN_MUTEX_SHARDS, ROBOTS_TTL_SECS,
};
pub use validation::validate;

use crate::cli::Cli;
use crate::ConfigError;

/// Builds and validates a [`CrawlerConfig`] from parsed CLI arguments.
pub fn from_cli(cli: &Cli) -> Result<CrawlerConfig, ConfigError> {
    let config = CrawlerConfig {
        seed_file: cli.seed_file.clone(),
        exclude_file: cli.exclude_file.clone(),
        data_dir: cli.data_dir.clone(),
        user_agent: UserAgentConfig {
            product: "PoliteCrawl".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            contact_email: cli.email.clone(),
        },
        num_fetcher_processes: cli.num_fetcher_processes,
        num_parser_processes: cli.num_parser_processes,
        fetcher_workers: cli.fetcher_workers,
        parser_workers: cli.parser_workers,
        max_pages: cli.max_pages,
        max_duration_secs: cli.max_duration,
        resume: !cli.fresh,
        seeded_urls_only: cli.seeded_urls_only,
        redis: RedisConfig {
            host: cli.redis_host.clone(),
            port: cli.redis_port,
            db: cli.redis_db,
            password: cli.redis_password.clone(),
        },
        backpressure: BackpressureConfig::default(),
    };

    validate(&config)?;
    Ok(config)
}

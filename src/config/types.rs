use std::path::PathBuf;

/// Validated, runtime configuration for every process in the crawler.
///
/// Built once by the orchestrator from [`crate::cli::Cli`] and shared
/// read-only with every spawned fetcher/parser process (re-derived from
/// their own copy of the CLI arguments, since processes share no memory).
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub seed_file: PathBuf,
    pub exclude_file: Option<PathBuf>,
    pub data_dir: PathBuf,

    pub user_agent: UserAgentConfig,

    pub num_fetcher_processes: u32,
    pub num_parser_processes: u32,
    pub fetcher_workers: u32,
    pub parser_workers: u32,

    pub max_pages: Option<u64>,
    pub max_duration_secs: Option<u64>,

    pub resume: bool,
    pub seeded_urls_only: bool,

    pub redis: RedisConfig,

    pub backpressure: BackpressureConfig,
}

/// User-agent identification, embedded in every outgoing HTTP request and
/// used to select the relevant `robots.txt` rule group.
#[derive(Debug, Clone)]
pub struct UserAgentConfig {
    pub product: String,
    pub version: String,
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value: `Product/Version (+mailto:email)`.
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+mailto:{})",
            self.product, self.version, self.contact_email
        )
    }

    /// The token robots.txt matchers should compare user-agent groups against.
    pub fn robots_token(&self) -> &str {
        &self.product
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl RedisConfig {
    /// Builds a `redis://` connection URL from the discrete CLI fields.
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pw) => format!(
                "redis://:{}@{}:{}/{}",
                pw, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Fetch-queue depth thresholds that govern producer backpressure (§4.4).
#[derive(Debug, Clone, Copy)]
pub struct BackpressureConfig {
    pub soft_threshold: u64,
    pub hard_threshold: u64,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            soft_threshold: 20_000,
            hard_threshold: 80_000,
        }
    }
}

/// Default crawl-delay floor (seconds) applied when robots.txt specifies
/// none or a smaller value.
pub const DEFAULT_CRAWL_DELAY_SECS: u64 = 70;

/// How long a fetched robots.txt is cached before being re-fetched.
pub const ROBOTS_TTL_SECS: i64 = 24 * 3600;

/// Fixed-size sharded mutex table width for process-local per-domain
/// serialization (frontier reads, parser content writes).
pub const DOMAIN_MUTEX_SHARDS: usize = 1024;

/// Number of hex-bucket directories used to cap frontier/content fan-out.
pub const DIRECTORY_BUCKETS: usize = 256;

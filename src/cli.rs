//! Command-line surface.
//!
//! This is the only configuration input the crawler accepts: there is no
//! config file layer.

use std::path::PathBuf;

use clap::Parser;

/// A polite, high-throughput web crawler core.
#[derive(Parser, Debug, Clone)]
#[command(name = "politecrawl")]
#[command(version)]
#[command(about = "Fetch/parse pipeline with politeness-enforced domain sharding", long_about = None)]
pub struct Cli {
    /// Path to the seed-file (one URL per line, '#' comments allowed)
    #[arg(long, value_name = "PATH")]
    pub seed_file: PathBuf,

    /// Contact email embedded in the crawler's User-Agent string
    #[arg(long)]
    pub email: String,

    /// Root directory for frontier files and saved content
    #[arg(long, value_name = "DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Path to a manual domain-exclusion file (one domain per line)
    #[arg(long, value_name = "PATH")]
    pub exclude_file: Option<PathBuf>,

    /// Number of fetcher processes, including the orchestrator's embedded shard 0
    #[arg(long, default_value_t = 2)]
    pub num_fetcher_processes: u32,

    /// Number of parser processes
    #[arg(long, default_value_t = 1)]
    pub num_parser_processes: u32,

    /// Concurrent fetch workers per fetcher process
    #[arg(long, default_value_t = 500)]
    pub fetcher_workers: u32,

    /// Concurrent parse workers per parser process
    #[arg(long, default_value_t = 80)]
    pub parser_workers: u32,

    /// Stop once this many pages have been crawled
    #[arg(long)]
    pub max_pages: Option<u64>,

    /// Stop after this many seconds of wall-clock runtime
    #[arg(long)]
    pub max_duration: Option<u64>,

    /// Resume from existing frontier/Redis state (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    pub resume: bool,

    /// Discard existing state and reseed from the seed file
    #[arg(long, conflicts_with = "resume")]
    pub fresh: bool,

    /// Only follow URLs whose domain was present in the seed file
    #[arg(long)]
    pub seeded_urls_only: bool,

    /// Redis host
    #[arg(long, default_value = "127.0.0.1")]
    pub redis_host: String,

    /// Redis port
    #[arg(long, default_value_t = 6379)]
    pub redis_port: u16,

    /// Redis logical database index
    #[arg(long, default_value_t = 0)]
    pub redis_db: i64,

    /// Redis password, if the instance requires auth
    #[arg(long)]
    pub redis_password: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Internal: role of a child process spawned by the orchestrator
    /// ("fetcher" or "parser"). Never set by an operator directly.
    #[arg(long, hide = true)]
    pub internal_role: Option<String>,

    /// Internal: shard/worker-pool id paired with `--internal-role`.
    #[arg(long, hide = true)]
    pub internal_id: Option<u32>,
}

/// Sets up the `tracing` subscriber from the CLI's `--log-level`.
///
/// Scoped to the crate target so dependency crates stay at `warn` unless the
/// operator asks for `trace`.
pub fn setup_logging(log_level: &str) {
    let filter = match log_level {
        "error" => "error",
        "warn" => "politecrawl=warn,warn",
        "info" => "politecrawl=info,warn",
        "debug" => "politecrawl=debug,info",
        "trace" => "trace",
        other => {
            eprintln!("unknown --log-level '{other}', defaulting to info");
            "politecrawl=info,warn"
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

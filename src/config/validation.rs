use crate::config::types::CrawlerConfig;
use crate::ConfigError;

/// Validates a fully-built [`CrawlerConfig`].
pub fn validate(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_process_topology(config)?;
    validate_backpressure(config)?;
    validate_email(&config.user_agent.contact_email)?;
    validate_product_token(&config.user_agent.product)?;
    Ok(())
}

fn validate_process_topology(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.num_fetcher_processes < 1 {
        return Err(ConfigError::Validation(
            "num_fetcher_processes must be >= 1 (the orchestrator always runs shard 0)".into(),
        ));
    }

    if config.num_parser_processes < 1 {
        return Err(ConfigError::Validation(
            "num_parser_processes must be >= 1".into(),
        ));
    }

    if config.fetcher_workers < 1 {
        return Err(ConfigError::Validation(
            "fetcher_workers must be >= 1".into(),
        ));
    }

    if config.parser_workers < 1 {
        return Err(ConfigError::Validation(
            "parser_workers must be >= 1".into(),
        ));
    }

    Ok(())
}

fn validate_backpressure(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let bp = config.backpressure;
    if bp.soft_threshold == 0 {
        return Err(ConfigError::Validation(
            "backpressure soft threshold must be > 0".into(),
        ));
    }

    if bp.hard_threshold <= bp.soft_threshold {
        return Err(ConfigError::Validation(format!(
            "backpressure hard threshold ({}) must exceed soft threshold ({})",
            bp.hard_threshold, bp.soft_threshold
        )));
    }

    Ok(())
}

/// Identifies the crawler in both the User-Agent header and the robots.txt
/// matching group, so it's restricted to characters safe in both contexts.
fn validate_product_token(product: &str) -> Result<(), ConfigError> {
    if product.is_empty() {
        return Err(ConfigError::Validation(
            "crawler product name cannot be empty".into(),
        ));
    }

    if !product.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return Err(ConfigError::Validation(format!(
            "crawler product name must contain only alphanumeric characters and hyphens, got '{}'",
            product
        )));
    }

    Ok(())
}

/// Basic shape check on `contact_email`: rejects anything that obviously
/// isn't `local@domain.tld` without attempting a full RFC 5322 parse.
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "--email cannot be empty".into(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() || !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "invalid email address: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{BackpressureConfig, RedisConfig, UserAgentConfig};
    use std::path::PathBuf;

    fn base_config() -> CrawlerConfig {
        CrawlerConfig {
            seed_file: PathBuf::from("seeds.txt"),
            exclude_file: None,
            data_dir: PathBuf::from("./data"),
            user_agent: UserAgentConfig {
                product: "PoliteCrawl".to_string(),
                version: "1.0".to_string(),
                contact_email: "crawl@example.com".to_string(),
            },
            num_fetcher_processes: 2,
            num_parser_processes: 1,
            fetcher_workers: 500,
            parser_workers: 80,
            max_pages: None,
            max_duration_secs: None,
            resume: true,
            seeded_urls_only: false,
            redis: RedisConfig {
                host: "127.0.0.1".to_string(),
                port: 6379,
                db: 0,
                password: None,
            },
            backpressure: BackpressureConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn rejects_zero_fetcher_processes() {
        let mut c = base_config();
        c.num_fetcher_processes = 0;
        assert!(validate(&c).is_err());
    }

    #[test]
    fn rejects_hard_threshold_below_soft() {
        let mut c = base_config();
        c.backpressure = BackpressureConfig {
            soft_threshold: 100,
            hard_threshold: 50,
        };
        assert!(validate(&c).is_err());
    }

    #[test]
    fn rejects_malformed_email() {
        let mut c = base_config();
        c.user_agent.contact_email = "not-an-email".to_string();
        assert!(validate(&c).is_err());
    }

    #[test]
    fn rejects_empty_product_name() {
        let mut c = base_config();
        c.user_agent.product = "".to_string();
        assert!(validate(&c).is_err());
    }
}

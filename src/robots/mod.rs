//! robots.txt acquisition, parsing, and in-process caching.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::ParsedRobots;

use reqwest::Client;

/// Fetches `robots.txt` for `domain`: tries `http://` first, falls back to
/// `https://` on any non-200 response, and treats a 404 or total failure as
/// "no rules" by returning an empty string (callers turn that into
/// [`ParsedRobots::allow_all`]).
pub async fn fetch_robots_content(client: &Client, domain: &str) -> String {
    for scheme in ["http", "https"] {
        let url = format!("{scheme}://{domain}/robots.txt");
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.text().await.unwrap_or_default();
            }
            _ => continue,
        }
    }
    String::new()
}

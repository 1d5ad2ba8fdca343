//! In-process memoization of parsed robots.txt content.
//!
//! Redis (`domain:<d>.robots_expires`) owns the 24h staleness decision; this
//! cache only avoids re-parsing the same `robots_content` string on every
//! `is_url_allowed`/`get_crawl_delay` call within one process, keyed by the
//! content string itself.

use std::collections::HashMap;

use crate::robots::ParsedRobots;

/// Caps the number of distinct robots.txt bodies memoized per process so a
/// pathological crawl touching millions of domains can't grow this
/// unboundedly; eviction is simple FIFO-by-insertion, not LRU, since hit
/// rate only matters within a domain's own repeated lookups.
#[cfg(not(test))]
const MAX_ENTRIES: usize = 50_000;
#[cfg(test)]
const MAX_ENTRIES: usize = 4;

pub struct RobotsCache {
    entries: HashMap<String, ParsedRobots>,
    insertion_order: Vec<String>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    /// Returns the memoized [`ParsedRobots`] for `content`, parsing and
    /// caching it if this is the first time this exact content is seen.
    pub fn get_or_parse(&mut self, content: &str) -> ParsedRobots {
        if let Some(parsed) = self.entries.get(content) {
            return parsed.clone();
        }

        let parsed = if content.is_empty() {
            ParsedRobots::allow_all()
        } else {
            ParsedRobots::from_content(content)
        };

        if self.insertion_order.len() >= MAX_ENTRIES {
            if let Some(oldest) = self.insertion_order.first().cloned() {
                self.entries.remove(&oldest);
                self.insertion_order.remove(0);
            }
        }
        self.entries.insert(content.to_string(), parsed.clone());
        self.insertion_order.push(content.to_string());

        parsed
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

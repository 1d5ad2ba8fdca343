//! robots.txt parsing: allow/disallow via the `robotstxt` crate, crawl-delay
//! extracted manually since `robotstxt` does not expose it.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data for one domain's current content.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    /// Wraps raw robots.txt content for matching.
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// A permissive instance, used when robots.txt is 404, unreachable, or
    /// the request otherwise fails — treated as "no rules" by callers.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Extracts the `Crawl-delay` directive (seconds) for `user_agent`,
    /// falling back to the `*` group. The group whose `User-agent` token
    /// matches `user_agent` case-insensitively wins over `*`; if neither
    /// group sets a delay, returns `None`.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let groups = parse_groups(&self.content);
        let user_agent = user_agent.to_lowercase();

        groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a == &user_agent))
            .or_else(|| groups.iter().find(|g| g.agents.iter().any(|a| a == "*")))
            .and_then(|g| g.crawl_delay)
    }
}

struct Group {
    agents: Vec<String>,
    crawl_delay: Option<f64>,
}

/// Splits robots.txt into `User-agent` groups, each carrying its own
/// `Crawl-delay` (a group's directives run until the next `User-agent`
/// line that doesn't immediately follow another `User-agent` line).
fn parse_groups(content: &str) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut current_agents: Vec<String> = Vec::new();
    let mut current_delay: Option<f64> = None;
    let mut in_agent_block = false;

    for raw_line in content.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if !in_agent_block && !current_agents.is_empty() {
                    groups.push(Group {
                        agents: std::mem::take(&mut current_agents),
                        crawl_delay: current_delay.take(),
                    });
                }
                current_agents.push(value.to_lowercase());
                in_agent_block = true;
            }
            "crawl-delay" => {
                in_agent_block = false;
                if let Ok(v) = value.parse::<f64>() {
                    current_delay = Some(v);
                }
            }
            _ => {
                in_agent_block = false;
            }
        }
    }

    if !current_agents.is_empty() {
        groups.push(Group {
            agents: current_agents,
            crawl_delay: current_delay,
        });
    }

    groups
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_permits_everything() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("/any/path", "TestBot"));
        assert!(robots.is_allowed("/admin", "TestBot"));
    }

    #[test]
    fn disallow_all_blocks_everything() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("/", "TestBot"));
    }

    #[test]
    fn disallow_specific_path() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_allowed("/page", "TestBot"));
        assert!(!robots.is_allowed("/admin", "TestBot"));
    }

    #[test]
    fn allow_overrides_narrower_disallow() {
        let robots =
            ParsedRobots::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_allowed("/private", "TestBot"));
        assert!(robots.is_allowed("/private/public", "TestBot"));
    }

    #[test]
    fn invalid_content_falls_back_to_allow() {
        let robots = ParsedRobots::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn crawl_delay_from_wildcard_group() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 5\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("TestBot"), Some(5.0));
    }

    #[test]
    fn crawl_delay_prefers_specific_agent_over_wildcard() {
        let robots = ParsedRobots::from_content(
            "User-agent: TestBot\nCrawl-delay: 10\n\nUser-agent: *\nCrawl-delay: 2",
        );
        assert_eq!(robots.crawl_delay("TestBot"), Some(10.0));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(2.0));
    }

    #[test]
    fn crawl_delay_absent_returns_none() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }

    #[test]
    fn crawl_delay_none_for_allow_all() {
        assert_eq!(ParsedRobots::allow_all().crawl_delay("TestBot"), None);
    }

    #[test]
    fn grouped_agents_share_one_block() {
        let robots = ParsedRobots::from_content(
            "User-agent: a\nUser-agent: b\nCrawl-delay: 3\nDisallow: /x",
        );
        assert_eq!(robots.crawl_delay("a"), Some(3.0));
        assert_eq!(robots.crawl_delay("b"), Some(3.0));
    }
}

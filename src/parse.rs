//! Link and text extraction from fetched HTML.
//!
//! Main-text extraction is deliberately best-effort: this picks a
//! reasonable body-text heuristic rather than a full readability
//! algorithm, since the exact extractor is out of scope.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};
use sha2::{Digest, Sha256};
use url::Url;

/// Tags whose text content is not part of the page's main text: script and
/// style bodies aren't prose at all, and nav/header/footer are chrome that
/// repeats across every page on a site.
const SKIP_TAGS: [&str; 5] = ["script", "style", "nav", "header", "footer"];

/// Everything a parser worker extracts from one fetched page.
pub struct ParsedContent {
    pub links: Vec<String>,
    pub text: String,
}

/// Extracts links (absolute, and relative resolved against `final_url`)
/// and a best-effort main-text rendering.
///
/// Link rules mirror the crawl's historical allowlist: `<a href>` and
/// `<link rel="canonical">` are followed, `download` links, fragment-only
/// hrefs, and `javascript:`/`mailto:`/`tel:`/`data:` schemes are not.
pub fn parse_html(html: &str, final_url: &Url) -> ParsedContent {
    let document = Html::parse_document(html);
    ParsedContent {
        links: extract_links(&document, final_url),
        text: extract_text(&document),
    }
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                if let Some(resolved) = resolve_link(href, base_url) {
                    links.push(resolved);
                }
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(resolved) = resolve_link(href, base_url) {
                    links.push(resolved);
                }
            }
        }
    }

    links
}

fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute.to_string())
    } else {
        None
    }
}

/// Concatenates text from tags likely to hold prose, skipping script/style
/// content and navigational chrome.
fn extract_text(document: &Html) -> String {
    let mut text = String::new();
    collect_text(document.tree.root(), &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Walks the tree under `node`, appending every text node's content to
/// `out` except within a subtree rooted at a [`SKIP_TAGS`] element.
fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(t) => {
            out.push_str(&t.text);
            out.push(' ');
            return;
        }
        Node::Element(el) if SKIP_TAGS.contains(&el.name()) => return,
        _ => {}
    }

    for child in node.children() {
        collect_text(child, out);
    }
}

pub fn content_path(data_dir: &Path, url: &str) -> PathBuf {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    data_dir
        .join("content")
        .join(&digest[0..2])
        .join(format!("{digest}.txt"))
}

/// Writes `text` to `path` atomically via write-temp-then-rename, so a
/// reader never observes a partially written file.
pub async fn write_content_atomically(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, text.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Tracks consecutive parse failures per URL so a poison item can be
/// dropped instead of looping forever through `fetch:queue`.
pub struct FailureCounter {
    counts: Mutex<HashMap<String, u32>>,
}

const MAX_CONSECUTIVE_FAILURES: u32 = 3;

impl FailureCounter {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure for `url` and returns `true` if it has now failed
    /// enough consecutive times that it should be dropped rather than
    /// re-queued.
    pub fn record_failure(&self, url: &str) -> bool {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(url.to_string()).or_insert(0);
        *count += 1;
        *count >= MAX_CONSECUTIVE_FAILURES
    }

    pub fn clear(&self, url: &str) {
        self.counts.lock().unwrap().remove(url);
    }
}

impl Default for FailureCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn extracts_absolute_link() {
        let html = r#"<html><body><a href="https://other.com/page">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links, vec!["https://other.com/page"]);
    }

    #[test]
    fn resolves_relative_link_against_final_url() {
        let html = r#"<html><body><a href="/other">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links, vec!["https://example.com/other"]);
    }

    #[test]
    fn skips_javascript_mailto_tel_and_data_links() {
        let html = r#"<html><body>
            <a href="javascript:void(0)">a</a>
            <a href="mailto:test@example.com">b</a>
            <a href="tel:+1234567890">c</a>
            <a href="data:text/html,hi">d</a>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn skips_download_and_fragment_links() {
        let html = r##"<html><body>
            <a href="/file.pdf" download>dl</a>
            <a href="#section">jump</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn includes_canonical_link() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canonical" /></head></html>"#;
        let parsed = parse_html(html, &base_url());
        assert!(parsed.links.contains(&"https://example.com/canonical".to_string()));
    }

    #[test]
    fn extracts_body_text() {
        let html = r#"<html><body><p>Hello   world</p></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.text, "Hello world");
    }

    #[test]
    fn skips_script_style_nav_header_footer_text() {
        let html = r#"<html>
            <head><script>var x = 1;</script><style>p { color: red; }</style></head>
            <body>
                <nav>nav link</nav>
                <header>header text</header>
                <p>real content</p>
                <footer>footer text</footer>
            </body>
        </html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.text, "real content");
    }

    #[test]
    fn content_path_is_keyed_by_url_hash() {
        let path = content_path(Path::new("/data"), "https://example.com/");
        assert!(path.starts_with("/data/content"));
        assert_eq!(path.extension().unwrap(), "txt");
    }

    #[tokio::test]
    async fn write_content_atomically_creates_parent_dirs_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xx").join("file.txt");
        write_content_atomically(&path, "hello").await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "hello");
        assert!(!path.with_extension("txt.tmp").exists());
    }

    #[test]
    fn failure_counter_drops_after_three_consecutive_failures() {
        let counter = FailureCounter::new();
        assert!(!counter.record_failure("https://example.com/"));
        assert!(!counter.record_failure("https://example.com/"));
        assert!(counter.record_failure("https://example.com/"));
    }

    #[test]
    fn failure_counter_clear_resets_the_count() {
        let counter = FailureCounter::new();
        counter.record_failure("https://example.com/");
        counter.clear("https://example.com/");
        assert!(!counter.record_failure("https://example.com/"));
    }
}

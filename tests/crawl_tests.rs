//! End-to-end exercise of the fetch -> robots-gate -> parse -> persist
//! pipeline against a mock HTTP server, without requiring a running Redis
//! instance (none of these modules talk to Redis directly).

use politecrawl::config::UserAgentConfig;
use politecrawl::fetch::{build_client, fetch_url, FetchOutcome};
use politecrawl::parse::{content_path, parse_html, write_content_atomically};
use politecrawl::robots::{fetch_robots_content, ParsedRobots};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        product: "PoliteCrawlTest".to_string(),
        version: "1.0".to_string(),
        contact_email: "crawl@example.com".to_string(),
    }
}

#[tokio::test]
async fn robots_txt_disallow_blocks_matching_paths_but_not_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /private\nCrawl-delay: 2"),
        )
        .mount(&server)
        .await;

    let client = build_client(&test_user_agent()).unwrap();
    let domain = server.uri().trim_start_matches("http://").to_string();
    let content = fetch_robots_content(&client, &domain).await;
    let robots = ParsedRobots::from_content(&content);

    assert!(robots.is_allowed("/public", "PoliteCrawlTest"));
    assert!(!robots.is_allowed("/private", "PoliteCrawlTest"));
    assert_eq!(robots.crawl_delay("PoliteCrawlTest"), Some(2.0));
}

#[tokio::test]
async fn missing_robots_txt_allows_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = build_client(&test_user_agent()).unwrap();
    let domain = server.uri().trim_start_matches("http://").to_string();
    let content = fetch_robots_content(&client, &domain).await;
    let robots = ParsedRobots::from_content(&content);

    assert!(robots.is_allowed("/anything", "PoliteCrawlTest"));
}

#[tokio::test]
async fn full_page_fetch_extracts_links_and_skips_chrome_text() {
    let server = MockServer::start().await;
    let body = format!(
        r##"<html>
<head><script>var x = "tracking";</script><style>.hidden {{ display: none; }}</style></head>
<body>
<nav>Home | About | Contact</nav>
<header>Site Header</header>
<main>
  <p>The quick brown fox jumps over the lazy dog.</p>
  <a href="/next-page">Next page</a>
  <a href="{}/other">Other page</a>
  <a href="/report.pdf" download>Report</a>
  <a href="#section">Jump</a>
  <a href="javascript:void(0)">Nothing</a>
  <link rel="canonical" href="/canonical-page">
</main>
<footer>Copyright 2026</footer>
</body>
</html>"##,
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/index"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let client = build_client(&test_user_agent()).unwrap();
    let url = format!("{}/index", server.uri());
    let outcome = fetch_url(&client, &url).await;

    let (final_url, html) = match outcome {
        FetchOutcome::Html { final_url, body, .. } => {
            (final_url, String::from_utf8(body).unwrap())
        }
        _ => panic!("expected Html outcome"),
    };

    let base = url::Url::parse(&final_url).unwrap();
    let parsed = parse_html(&html, &base);

    assert!(parsed.text.contains("quick brown fox"));
    assert!(!parsed.text.contains("tracking"));
    assert!(!parsed.text.contains("Home | About | Contact"));
    assert!(!parsed.text.contains("Site Header"));
    assert!(!parsed.text.contains("Copyright 2026"));

    assert!(parsed.links.iter().any(|l| l.ends_with("/next-page")));
    assert!(parsed.links.iter().any(|l| l.ends_with("/other")));
    assert!(parsed.links.iter().any(|l| l.ends_with("/canonical-page")));
    assert!(!parsed.links.iter().any(|l| l.ends_with(".pdf")));
    assert!(!parsed.links.iter().any(|l| l.contains('#')));
    assert!(!parsed.links.iter().any(|l| l.starts_with("javascript:")));
}

#[tokio::test]
async fn redirected_fetch_reports_the_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>moved</body></html>"),
        )
        .mount(&server)
        .await;

    let client = build_client(&test_user_agent()).unwrap();
    let requested = format!("{}/old", server.uri());
    let outcome = fetch_url(&client, &requested).await;

    match outcome {
        FetchOutcome::Html { final_url, .. } => {
            assert!(final_url.ends_with("/new"));
            assert_ne!(final_url, requested);
        }
        _ => panic!("expected Html outcome"),
    }
}

#[tokio::test]
async fn parsed_page_content_is_persisted_under_a_hashed_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><p>hello world</p></body></html>"),
        )
        .mount(&server)
        .await;

    let client = build_client(&test_user_agent()).unwrap();
    let url = format!("{}/page", server.uri());
    let outcome = fetch_url(&client, &url).await;
    let (final_url, html) = match outcome {
        FetchOutcome::Html { final_url, body, .. } => {
            (final_url, String::from_utf8(body).unwrap())
        }
        _ => panic!("expected Html outcome"),
    };

    let base = url::Url::parse(&final_url).unwrap();
    let parsed = parse_html(&html, &base);

    let data_dir = tempfile::tempdir().unwrap();
    let path = content_path(data_dir.path(), &url);
    write_content_atomically(&path, &parsed.text).await.unwrap();

    let saved = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(saved, parsed.text);
    assert!(path.starts_with(data_dir.path().join("content")));

    // Same URL always hashes to the same path, so a re-crawl overwrites
    // rather than accumulating duplicate files.
    assert_eq!(content_path(data_dir.path(), &url), path);
}

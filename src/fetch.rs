//! HTTP fetching.
//!
//! The HTTP client itself — timeouts, redirects, TLS, cookies — is out of
//! scope: this wraps a standard `reqwest::Client` configured to follow
//! redirects itself and classifies the outcome into what the rest of the
//! pipeline needs (route to `fetch:queue` vs. a `visited:` record).

use reqwest::{redirect::Policy, Client};
use std::time::Duration;

use crate::config::UserAgentConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_REDIRECTS: usize = 10;

/// Builds the shared client used by every worker in a fetcher process.
pub fn build_client(user_agent: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// The outcome of fetching one URL, already classified per §4.4.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Success with an HTML content type: queued for parsing.
    Html {
        final_url: String,
        status_code: u16,
        content_type: String,
        body: Vec<u8>,
    },
    /// Success with any other content type: recorded as visited, not parsed.
    NonHtml {
        final_url: String,
        status_code: u16,
        content_type: String,
    },
    /// A response was received but its status is an error, or the request
    /// failed outright (`class` distinguishes the error for metrics).
    Error { class: ErrorClass, status: Option<u16> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Timeout,
    ConnectionFailed,
    TlsError,
    HttpClientError,
    HttpServerError,
    Other,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed => "connection_failed",
            Self::TlsError => "tls_error",
            Self::HttpClientError => "http_4xx",
            Self::HttpServerError => "http_5xx",
            Self::Other => "other",
        }
    }

    fn from_status(status: u16) -> Self {
        if (400..500).contains(&status) {
            Self::HttpClientError
        } else {
            Self::HttpServerError
        }
    }

    fn from_reqwest_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::ConnectionFailed
        } else {
            Self::Other
        }
    }
}

/// Fetches `url` and classifies the result. Never returns an `Err`: every
/// failure mode becomes `FetchOutcome::Error` so the caller can record a
/// `visited:` entry and move on without special-casing network failures.
pub async fn fetch_url(client: &Client, url: &str) -> FetchOutcome {
    let response = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(err) => {
            return FetchOutcome::Error {
                class: ErrorClass::from_reqwest_error(&err),
                status: err.status().map(|s| s.as_u16()),
            }
        }
    };

    let final_url = response.url().to_string();
    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if status_code >= 400 {
        return FetchOutcome::Error {
            class: ErrorClass::from_status(status_code),
            status: Some(status_code),
        };
    }

    let is_html = content_type.to_lowercase().contains("text/html");
    if !is_html {
        return FetchOutcome::NonHtml {
            final_url,
            status_code,
            content_type,
        };
    }

    match response.bytes().await {
        Ok(body) => FetchOutcome::Html {
            final_url,
            status_code,
            content_type,
            body: body.to_vec(),
        },
        Err(err) => FetchOutcome::Error {
            class: ErrorClass::from_reqwest_error(&err),
            status: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_user_agent() -> UserAgentConfig {
        UserAgentConfig {
            product: "TestCrawler".to_string(),
            version: "1.0".to_string(),
            contact_email: "crawl@example.com".to_string(),
        }
    }

    #[test]
    fn error_class_distinguishes_4xx_and_5xx() {
        assert_eq!(ErrorClass::from_status(404), ErrorClass::HttpClientError);
        assert_eq!(ErrorClass::from_status(503), ErrorClass::HttpServerError);
    }

    #[tokio::test]
    async fn fetches_html_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<html><body>hi</body></html>"),
            )
            .mount(&server)
            .await;

        let client = build_client(&test_user_agent()).unwrap();
        let outcome = fetch_url(&client, &format!("{}/page", server.uri())).await;
        match outcome {
            FetchOutcome::Html { status_code, body, .. } => {
                assert_eq!(status_code, 200);
                assert!(String::from_utf8(body).unwrap().contains("hi"));
            }
            other => panic!("expected Html outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_html_content_type_is_not_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4".to_vec()),
            )
            .mount(&server)
            .await;

        let client = build_client(&test_user_agent()).unwrap();
        let outcome = fetch_url(&client, &format!("{}/file.pdf", server.uri())).await;
        assert!(matches!(outcome, FetchOutcome::NonHtml { .. }));
    }

    #[tokio::test]
    async fn server_error_status_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = build_client(&test_user_agent()).unwrap();
        let outcome = fetch_url(&client, &format!("{}/broken", server.uri())).await;
        match outcome {
            FetchOutcome::Error { class, status } => {
                assert_eq!(class, ErrorClass::HttpServerError);
                assert_eq!(status, Some(503));
            }
            _ => panic!("expected Error outcome"),
        }
    }

    #[tokio::test]
    async fn client_error_status_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_client(&test_user_agent()).unwrap();
        let outcome = fetch_url(&client, &format!("{}/missing", server.uri())).await;
        match outcome {
            FetchOutcome::Error { class, status } => {
                assert_eq!(class, ErrorClass::HttpClientError);
                assert_eq!(status, Some(404));
            }
            _ => panic!("expected Error outcome"),
        }
    }

    #[tokio::test]
    async fn connection_failure_is_classified() {
        let client = build_client(&test_user_agent()).unwrap();
        let outcome = fetch_url(&client, "http://127.0.0.1:1/unreachable").await;
        assert!(matches!(
            outcome,
            FetchOutcome::Error {
                class: ErrorClass::ConnectionFailed,
                ..
            }
        ));
    }
}

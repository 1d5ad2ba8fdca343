//! The fetch-queue wire record: produced by fetchers, consumed by parsers.

use serde::{Deserialize, Serialize};

/// Response bodies longer than this are truncated before being queued, per
/// the external interface's fetch-queue record schema.
pub const MAX_HTML_BYTES: usize = 100 * 1024;

/// One fetched HTML page, serialized onto `fetch:queue` with `bincode`.
/// `bincode` gives a compact, schema-stable binary encoding that round-trips
/// `html` byte-for-byte, unlike a text format that would need escaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchQueueRecord {
    /// Final URL after any redirects.
    pub url: String,
    pub initial_url: String,
    pub domain: String,
    pub depth: u32,
    pub status_code: u16,
    pub content_type: String,
    pub is_redirect: bool,
    pub fetched_at: i64,
    pub html: Vec<u8>,
}

impl FetchQueueRecord {
    /// Builds a record, truncating `html` to [`MAX_HTML_BYTES`] if needed.
    pub fn new(
        url: String,
        initial_url: String,
        domain: String,
        depth: u32,
        status_code: u16,
        content_type: String,
        fetched_at: i64,
        mut html: Vec<u8>,
    ) -> Self {
        let is_redirect = url != initial_url;
        html.truncate(MAX_HTML_BYTES);
        Self {
            url,
            initial_url,
            domain,
            depth,
            status_code,
            content_type,
            is_redirect,
            fetched_at,
            html,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

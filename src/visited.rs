//! The `visited:` terminal record, written by both fetchers (non-HTML and
//! error outcomes) and parsers (successful HTML).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::redis_client::with_retry;
use crate::redis_keys;
use crate::RedisOpError;

pub struct VisitedRecord<'a> {
    pub url: &'a str,
    pub status_code: u16,
    pub content_type: &'a str,
    pub content_path: &'a str,
    pub crawled_at: i64,
    pub redirected_to: Option<&'a str>,
}

/// Writes a `visited:<sha256(url)>` hash. Last-writer-wins, at-least-once:
/// a retried or duplicate write for the same URL simply overwrites fields.
pub async fn record_visited(
    conn: &ConnectionManager,
    record: VisitedRecord<'_>,
) -> Result<(), RedisOpError> {
    let key = redis_keys::visited(record.url);
    let mut fields: Vec<(&'static str, String)> = vec![
        ("url", record.url.to_string()),
        ("status_code", record.status_code.to_string()),
        ("content_type", record.content_type.to_string()),
        ("content_path", record.content_path.to_string()),
        ("crawled_at", record.crawled_at.to_string()),
    ];
    if let Some(redirected_to) = record.redirected_to {
        fields.push(("redirected_to", redirected_to.to_string()));
    }

    with_retry("record visited", || {
        let mut conn = conn.clone();
        let key = key.clone();
        let fields = fields.clone();
        async move { conn.hset_multiple(&key, &fields).await }
    })
    .await
}

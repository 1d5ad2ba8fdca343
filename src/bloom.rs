//! The `seen:bloom` URL dedup filter.
//!
//! Backed by RedisBloom (`BF.*` commands). False positives are accepted
//! (a URL might be silently dropped); false negatives must never happen
//! (the filter never claims "unseen" for a URL it has seen).

use redis::aio::ConnectionManager;

use crate::redis_client::with_retry;
use crate::redis_keys;
use crate::RedisOpError;

/// Sized for ~160M URLs at a 0.1% false-positive rate, per the data model.
const EXPECTED_ITEMS: u64 = 160_000_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Creates `seen:bloom` with `BF.RESERVE` if it does not already exist.
/// Idempotent: an existing filter is left untouched.
pub async fn ensure_created(conn: &ConnectionManager) -> Result<(), RedisOpError> {
    let result = with_retry("bloom reserve", || {
        let mut conn = conn.clone();
        async move {
            redis::cmd("BF.RESERVE")
                .arg(redis_keys::seen_bloom())
                .arg(FALSE_POSITIVE_RATE)
                .arg(EXPECTED_ITEMS)
                .query_async::<_, ()>(&mut conn)
                .await
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(RedisOpError::Command(e)) if e.to_string().contains("item exists") => Ok(()),
        Err(e) => Err(e),
    }
}

/// `BF.EXISTS seen:bloom <url>` — true means "probably present".
pub async fn might_contain(conn: &ConnectionManager, url: &str) -> Result<bool, RedisOpError> {
    with_retry("bloom exists", || {
        let mut conn = conn.clone();
        let url = url.to_string();
        async move {
            redis::cmd("BF.EXISTS")
                .arg(redis_keys::seen_bloom())
                .arg(&url)
                .query_async::<_, bool>(&mut conn)
                .await
        }
    })
    .await
}

/// `BF.ADD seen:bloom <url>`.
pub async fn add(conn: &ConnectionManager, url: &str) -> Result<(), RedisOpError> {
    with_retry("bloom add", || {
        let mut conn = conn.clone();
        let url = url.to_string();
        async move {
            redis::cmd("BF.ADD")
                .arg(redis_keys::seen_bloom())
                .arg(&url)
                .query_async::<_, bool>(&mut conn)
                .await
                .map(|_| ())
        }
    })
    .await
}

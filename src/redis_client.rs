//! Redis connection management and the shared bounded-retry policy.
//!
//! Every subsystem that talks to Redis goes through [`RedisPools::text`] /
//! [`RedisPools::bytes`] for a connection and [`with_retry`] for the retry
//! envelope, rather than reimplementing backoff per call site.

use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Client;
use tokio::time::sleep;
use tracing::warn;

use crate::RedisOpError;

const MAX_ATTEMPTS: u32 = 3;
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// The two connection managers a process needs: one whose responses are
/// decoded as UTF-8 strings (domain hashes, queues, locks) and one used for
/// the fetch queue, whose payloads are opaque bincode bytes. `redis`'s
/// `ConnectionManager` multiplexes and reconnects automatically, so both
/// halves are cheap to clone and share across worker tasks.
#[derive(Clone)]
pub struct RedisPools {
    text: ConnectionManager,
    bytes: ConnectionManager,
}

impl RedisPools {
    /// Opens both connection managers against the same logical database.
    pub async fn connect(connection_url: &str) -> Result<Self, RedisOpError> {
        let client = Client::open(connection_url)
            .map_err(|e| RedisOpError::PoolUnavailable(e.to_string()))?;
        let text = ConnectionManager::new(client.clone())
            .await
            .map_err(RedisOpError::Command)?;
        let bytes = ConnectionManager::new(client)
            .await
            .map_err(RedisOpError::Command)?;
        Ok(Self { text, bytes })
    }

    pub fn text(&self) -> ConnectionManager {
        self.text.clone()
    }

    pub fn bytes(&self) -> ConnectionManager {
        self.bytes.clone()
    }
}

/// Runs `op` with up to three attempts and exponential backoff (capped at
/// 5s), per the transient-Redis-error policy. Intended to wrap one Redis
/// round trip per call, not a whole multi-command sequence.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, RedisOpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, redis::RedisError>>,
{
    let mut attempt = 0;
    let mut backoff = Duration::from_millis(100);
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!(op = op_name, attempt, error = %e, "redis operation failed, retrying");
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(RedisOpError::Command(e)),
        }
    }
}

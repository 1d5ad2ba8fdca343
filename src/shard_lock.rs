//! Init-phase Redis locking.
//!
//! Per the concurrency model, the only Redis locks taken anywhere in the
//! crawler guard one-time global initialization (`lock:init`): schema setup,
//! resharding, and bloom-filter creation. The hot fetch/parse path takes no
//! Redis locks at all.

use std::time::Duration;

use rand::Rng;
use redis::AsyncCommands;
use tokio::time::sleep;

use crate::redis_client::with_retry;
use crate::redis_keys;
use crate::RedisOpError;

/// Holds a single Redis lock, identified by name, with a TTL and a
/// process-unique token so a stale lock can be told apart from one actively
/// held by a live process.
pub struct LockManager {
    conn: redis::aio::ConnectionManager,
    token: String,
}

impl LockManager {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        let token: u64 = rand::thread_rng().gen();
        Self {
            conn,
            token: format!("{}-{:016x}", std::process::id(), token),
        }
    }

    /// Attempts to take `lock:<name>`, retrying until `deadline` elapses.
    /// Returns the held [`LockHandle`] once acquired.
    pub async fn acquire(
        &mut self,
        name: &str,
        ttl: Duration,
        deadline: Duration,
    ) -> Result<LockHandle, RedisOpError> {
        let key = redis_keys::lock(name);
        let waited = tokio::time::Instant::now();
        loop {
            let token = self.token.clone();
            let acquired: bool = with_retry("lock acquire", || {
                let mut conn = self.conn.clone();
                let key = key.clone();
                let token = token.clone();
                let ttl_ms = ttl.as_millis() as u64;
                async move {
                    redis::cmd("SET")
                        .arg(&key)
                        .arg(&token)
                        .arg("NX")
                        .arg("PX")
                        .arg(ttl_ms)
                        .query_async::<_, Option<String>>(&mut conn)
                        .await
                        .map(|r| r.is_some())
                }
            })
            .await?;

            if acquired {
                return Ok(LockHandle {
                    conn: self.conn.clone(),
                    key,
                    token: self.token.clone(),
                });
            }

            if waited.elapsed() >= deadline {
                return Err(RedisOpError::PoolUnavailable(format!(
                    "timed out waiting for lock '{name}'"
                )));
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// Best-effort sweep of locks whose token prefix matches a crashed
    /// process from this host (§4.3 step 3). Only ever called against
    /// `lock:init`, since it's the only lock name in use.
    pub async fn clear_if_owned_by_dead_process(
        &mut self,
        name: &str,
        is_pid_alive: impl Fn(u32) -> bool,
    ) -> Result<(), RedisOpError> {
        let key = redis_keys::lock(name);
        let held: Option<String> = with_retry("lock inspect", || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            async move { conn.get(&key).await }
        })
        .await?;

        let Some(held) = held else { return Ok(()) };
        let Some((pid_str, _)) = held.split_once('-') else {
            return Ok(());
        };
        let Ok(pid) = pid_str.parse::<u32>() else {
            return Ok(());
        };

        if !is_pid_alive(pid) {
            with_retry("lock clear stale", || {
                let mut conn = self.conn.clone();
                let key = key.clone();
                let held = held.clone();
                async move {
                    let current: Option<String> = conn.get(&key).await?;
                    if current.as_deref() == Some(held.as_str()) {
                        conn.del(&key).await
                    } else {
                        Ok(0)
                    }
                }
            })
            .await?;
        }

        Ok(())
    }
}

/// A held lock, released (only if still owned by this token) on drop via
/// [`LockHandle::release`].
pub struct LockHandle {
    conn: redis::aio::ConnectionManager,
    key: String,
    token: String,
}

impl LockHandle {
    /// Releases the lock, but only if it still holds our token (it may have
    /// expired and been reacquired by someone else).
    pub async fn release(self) -> Result<(), RedisOpError> {
        with_retry("lock release", || {
            let key = self.key.clone();
            let token = self.token.clone();
            let mut conn = self.conn.clone();
            async move {
                let current: Option<String> = conn.get(&key).await?;
                if current.as_deref() == Some(token.as_str()) {
                    conn.del(&key).await
                } else {
                    Ok(0)
                }
            }
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_scoped_to_this_process_pid() {
        // constructing a LockManager needs a live connection, so we only
        // check the token shape here: "<pid>-<16 hex chars>"
        let pid = std::process::id();
        let token = format!("{}-{:016x}", pid, 0u64);
        let (prefix, suffix) = token.split_once('-').unwrap();
        assert_eq!(prefix.parse::<u32>().unwrap(), pid);
        assert_eq!(suffix.len(), 16);
    }
}

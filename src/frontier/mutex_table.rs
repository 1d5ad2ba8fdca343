//! Fixed-size sharded mutex table.
//!
//! A map from domain strings to per-domain mutexes would grow unboundedly.
//! Instead this is a fixed `K`-wide table of `tokio::sync::Mutex`, indexed
//! by `hash(domain) mod K`; collisions only serialize unrelated domains
//! within one process, which is benign. Used independently by fetchers
//! (serializing `get_next_url` per domain) and by parsers (serializing
//! frontier-file appends per domain) — each side owns its own table.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

pub struct DomainMutexTable {
    shards: Vec<Mutex<()>>,
}

impl DomainMutexTable {
    pub fn new(width: usize) -> Self {
        let mut shards = Vec::with_capacity(width);
        shards.resize_with(width, || Mutex::new(()));
        Self { shards }
    }

    /// Locks the shard owning `domain`. The guard serializes every other
    /// domain that hashes to the same shard too, by design.
    pub async fn lock(&self, domain: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        domain.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        self.shards[index].lock().await
    }
}

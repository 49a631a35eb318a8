//! Presence cache: remembers which records were recently confirmed to
//! exist at the provider.
//!
//! Entries expire lazily: a lookup never returns an expired entry, and
//! [`PresenceCache::sweep`] drops the dead ones in bulk. Entries are never
//! removed early; they only lapse.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nodecycle_state::Clock;
use tokio::sync::RwLock;

/// Concurrency-safe map from record key to expiry (unix seconds).
#[derive(Clone)]
pub struct PresenceCache {
    entries: Arc<RwLock<HashMap<String, u64>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl PresenceCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    /// Time left before `key` goes stale; `None` if absent or expired.
    pub async fn remaining(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|expires_at| now < **expires_at)
            .map(|expires_at| Duration::from_secs(expires_at - now))
    }

    /// Record `key` as present for the default TTL, rounded up to whole
    /// seconds so a sub-second TTL still caches for one tick.
    pub async fn insert(&self, key: &str) {
        let ttl_secs = self.ttl.as_secs() + u64::from(self.ttl.subsec_nanos() > 0);
        let expires_at = self.clock.now().saturating_add(ttl_secs);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), expires_at);
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| now < *expires_at);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

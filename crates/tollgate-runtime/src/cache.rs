//! Response cache.
//!
//! Content-addressed: keys are caller-supplied or a fingerprint of the
//! normalized task, so identical work from different callers shares one
//! entry. Each entry carries its own expiry, checked against the injected
//! [`Clock`]; expired entries read as a miss and are evicted on the spot,
//! and a periodic sweep removes the ones nobody asks for again.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tollgate_core::{Clock, SystemClock};

use crate::config::CacheConfig;

/// A cached delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,

    /// Backend that originally produced the payload
    pub backend_id: String,

    /// Gate score of the original delivery
    pub quality_score: f64,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,

    /// Expired entries removed, lazily or by sweep
    pub evictions: u64,
}

/// TTL cache of delivered outputs.
pub struct ResponseCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = Cache::builder().max_capacity(config.max_entries).build();
        Self {
            cache,
            default_ttl: config.default_ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a live entry.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_expired(self.clock.now()) => {
                self.cache.invalidate(key).await;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "Cache entry expired");
                None
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "Cache hit");
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "Cache miss");
                None
            }
        }
    }

    /// Store a payload; `ttl` defaults to the configured TTL.
    ///
    /// Last writer wins.
    pub async fn put(
        &self,
        key: &str,
        payload: impl Into<String>,
        backend_id: &str,
        quality_score: f64,
        ttl: Option<Duration>,
    ) {
        let now = self.clock.now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry {
            key: key.to_string(),
            payload: payload.into(),
            backend_id: backend_id.to_string(),
            quality_score,
            created_at: now,
            expires_at,
        };
        self.cache.insert(key.to_string(), entry).await;
    }

    /// Remove every expired entry. Returns how many were removed.
    pub async fn sweep(&self) -> u64 {
        let now = self.clock.now();
        let expired: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            self.cache.invalidate(key.as_str()).await;
        }
        self.cache.run_pending_tasks().await;

        let removed = expired.len() as u64;
        self.evictions.fetch_add(removed, Ordering::Relaxed);
        if removed > 0 {
            tracing::debug!(removed, "Cache sweep removed expired entries");
        }
        removed
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Sweep on a fixed interval until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

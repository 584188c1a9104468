//! Response cache with per-entry TTL, pattern invalidation and LRU eviction.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ApiError, Result};

/// Selects cache keys for invalidation.
#[derive(Debug, Clone)]
pub enum CachePattern {
    /// Every key containing the text.
    Substring(String),
    /// Every key the expression matches.
    Regex(Regex),
}

impl CachePattern {
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| ApiError::validation(format!("Invalid cache pattern {pattern:?}: {e}")))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Substring(needle) => key.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(key),
        }
    }
}

impl From<&str> for CachePattern {
    fn from(value: &str) -> Self {
        Self::Substring(value.to_string())
    }
}

impl From<String> for CachePattern {
    fn from(value: String) -> Self {
        Self::Substring(value)
    }
}

/// In-memory TTL cache keyed by logical request key.
///
/// Cheap to clone; clones share entries. Time comes from
/// [`tokio::time::Instant`], so paused test clocks apply.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<RwLock<CacheInner>>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    default_ttl: Duration,
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    expiry: Instant,
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }
}

impl ResponseCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                max_entries: max_entries.max(1),
                default_ttl,
            })),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.read().default_ttl
    }

    /// Get a cached value by key, returning None if expired or missing.
    ///
    /// Expired entries are removed on the spot.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.write();
        let now = Instant::now();

        let entry = inner.entries.get_mut(key)?;
        if entry.is_expired(now) {
            inner.entries.remove(key);
            return None;
        }
        entry.last_accessed = now;
        Some(entry.value.clone())
    }

    /// When the live entry for `key` was stored.
    pub fn stored_at(&self, key: &str) -> Option<Instant> {
        let now = Instant::now();
        self.read()
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.stored_at)
    }

    /// Insert a value with an explicit TTL, evicting LRU if at capacity.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        let mut inner = self.write();
        let now = Instant::now();

        inner.entries.retain(|_, e| !e.is_expired(now));

        if !inner.entries.contains_key(&key) && inner.entries.len() >= inner.max_entries {
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&lru_key);
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                expiry: now + ttl,
                last_accessed: now,
            },
        );
    }

    /// Insert a value with the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let ttl = self.default_ttl();
        self.set(key, value, ttl);
    }

    /// Remove entries matching `pattern`, or everything when `None`.
    ///
    /// Returns the number of removed entries.
    pub fn invalidate(&self, pattern: Option<&CachePattern>) -> usize {
        let mut inner = self.write();
        let before = inner.entries.len();
        match pattern {
            Some(pattern) => inner.entries.retain(|key, _| !pattern.matches(key)),
            None => inner.entries.clear(),
        }
        let removed = before - inner.entries.len();
        if removed > 0 {
            tracing::debug!(removed, pattern = ?pattern, "cache invalidated");
        }
        removed
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut inner = self.write();
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now));
        before - inner.entries.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the cache is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<RwLock<CacheInner>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let swept = ResponseCache { inner }.sweep();
                if swept > 0 {
                    tracing::debug!(swept, "cache sweep removed expired entries");
                }
            }
        })
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.write().entries.clear();
    }

    /// Current number of entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

//! In-memory LRU loading cache.

use super::{CacheStat, EventBus, Key, LoadingCache};
use crate::config::CacheConfig;
use crate::error::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

struct Entry {
    data: Vec<u8>,
    scopes: Vec<String>,
    expires: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires.is_some_and(|at| now >= at)
    }
}

struct Inner {
    entries: LruCache<String, Entry>,
    size: usize,
    stat: CacheStat,
}

impl Inner {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.size -= entry.data.len();
                true
            }
            None => false,
        }
    }
}

/// Loading cache holding values in process memory.
///
/// The lock is never held while a loader runs, so concurrent misses for the
/// same key may load twice; the later store wins.
pub struct MemoryCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
    notifier: Option<Sender<Vec<String>>>,
}

impl MemoryCache {
    /// Creates a cache without flush notifications.
    pub fn new(config: CacheConfig) -> Self {
        let entries = match NonZeroUsize::new(config.max_keys) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            config,
            inner: Mutex::new(Inner {
                entries,
                size: 0,
                stat: CacheStat::default(),
            }),
            notifier: None,
        }
    }

    /// Creates a cache that reports every flush to `bus` from a background
    /// thread.
    pub fn with_bus(config: CacheConfig, bus: Arc<dyn EventBus>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Vec<String>>();
        std::thread::Builder::new()
            .name("cache-flush-notify".to_string())
            .spawn(move || {
                for scopes in rx {
                    bus.publish(&scopes);
                }
                debug!("cache flush notifier stopped");
            })?;

        let mut cache = Self::new(config);
        cache.notifier = Some(tx);
        Ok(cache)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            error!("cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn storable(&self, key: &str, data: &[u8]) -> bool {
        let limits = &self.config;
        if limits.max_key_size > 0 && key.len() > limits.max_key_size {
            return false;
        }
        if limits.max_value_size > 0 && data.len() > limits.max_value_size {
            return false;
        }
        if limits.max_cache_size > 0 && data.len() > limits.max_cache_size {
            return false;
        }
        true
    }

    fn store(&self, key: String, data: &[u8], scopes: Vec<String>, ttl: Option<Duration>) {
        let mut inner = self.lock();
        let entry = Entry {
            data: data.to_vec(),
            scopes,
            expires: ttl.map(|ttl| Instant::now() + ttl),
        };
        inner.size += data.len();
        if let Some((old_key, old)) = inner.entries.push(key.clone(), entry) {
            inner.size -= old.data.len();
            if old_key != key {
                inner.stat.evicted += 1;
            }
        }
        inner.stat.added += 1;

        // oldest entries go first when over the total size limit
        let max_size = self.config.max_cache_size;
        while max_size > 0 && inner.size > max_size {
            match inner.entries.pop_lru() {
                Some((_, old)) => {
                    inner.size -= old.data.len();
                    inner.stat.evicted += 1;
                }
                None => break,
            }
        }
    }
}

impl LoadingCache for MemoryCache {
    fn get(
        &self,
        key: &Key,
        ttl: Option<Duration>,
        loader: &dyn Fn() -> Result<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let rendered = key.to_string();
        {
            let mut inner = self.lock();
            let now = Instant::now();
            let cached = match inner.entries.get(&rendered) {
                Some(entry) if !entry.expired(now) => Some(entry.data.clone()),
                Some(_) => {
                    inner.remove(&rendered);
                    inner.stat.evicted += 1;
                    None
                }
                None => None,
            };
            if let Some(data) = cached {
                inner.stat.hits += 1;
                return Ok(data);
            }
            inner.stat.misses += 1;
        }

        let data = loader()?;

        if key.is_valid() && self.storable(&rendered, &data) {
            let ttl = ttl.or(self.config.ttl);
            self.store(rendered, &data, key.scope_list().to_vec(), ttl);
        } else {
            debug!(key_len = rendered.len(), value_bytes = data.len(), "cache: value not stored");
        }
        Ok(data)
    }

    fn flush(&self, scopes: &[String]) -> usize {
        let removed = {
            let mut inner = self.lock();
            if scopes.is_empty() {
                let count = inner.entries.len();
                inner.entries.clear();
                inner.size = 0;
                count
            } else {
                let matching: Vec<String> = inner
                    .entries
                    .iter()
                    .filter(|(_, entry)| entry.scopes.iter().any(|s| scopes.contains(s)))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &matching {
                    inner.remove(key);
                }
                matching.len()
            }
        };

        if let Some(notifier) = &self.notifier {
            if notifier.send(scopes.to_vec()).is_err() {
                warn!("cache flush notifier is gone");
            }
        }
        debug!(scopes = ?scopes, removed = removed, "cache flushed");
        removed
    }

    fn stat(&self) -> CacheStat {
        let inner = self.lock();
        CacheStat {
            keys: inner.entries.len(),
            size: inner.size,
            ..inner.stat
        }
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("config", &self.config)
            .field("stat", &self.stat())
            .finish()
    }
}

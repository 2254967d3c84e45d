//! Scoped response caching.
//!
//! Read results are cached under a [`Key`] that lists the scopes it depends
//! on. Every write flushes the scopes it touched, see [`comment_scopes`].

mod key;
mod memory;

pub use key::Key;
pub use memory::MemoryCache;

use crate::error::Result;
use crate::store::Locator;
use serde::Serialize;
use std::time::Duration;

/// Scope shared by all "last comments" queries of every site.
pub const LAST_COMMENTS_SCOPE: &str = "last";

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStat {
    pub hits: u64,
    pub misses: u64,
    pub added: u64,
    pub evicted: u64,
    pub keys: usize,
    pub size: usize,
}

/// A cache that fills itself from a loader on miss.
pub trait LoadingCache: Send + Sync {
    /// Returns the cached value for `key`, or runs `loader` and caches its
    /// result. Loader errors are returned and never cached. `ttl` overrides
    /// the cache-wide default.
    fn get(
        &self,
        key: &Key,
        ttl: Option<Duration>,
        loader: &dyn Fn() -> Result<Vec<u8>>,
    ) -> Result<Vec<u8>>;

    /// Removes every entry with a scope in `scopes`; an empty list purges
    /// the whole cache. Returns the number of removed entries.
    fn flush(&self, scopes: &[String]) -> usize;

    fn stat(&self) -> CacheStat;
}

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopCache;

impl LoadingCache for NopCache {
    fn get(
        &self,
        _key: &Key,
        _ttl: Option<Duration>,
        loader: &dyn Fn() -> Result<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        loader()
    }

    fn flush(&self, _scopes: &[String]) -> usize {
        0
    }

    fn stat(&self) -> CacheStat {
        CacheStat::default()
    }
}

/// Receives flush notifications, e.g. to fan them out to peer instances.
pub trait EventBus: Send + Sync {
    fn publish(&self, scopes: &[String]);
}

/// Bus that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopBus;

impl EventBus for NopBus {
    fn publish(&self, _scopes: &[String]) {}
}

/// Scopes invalidated by a write to a comment of `user_id` on `locator`.
pub fn comment_scopes(locator: &Locator, user_id: &str) -> Vec<String> {
    vec![
        locator.url.clone(),
        LAST_COMMENTS_SCOPE.to_string(),
        user_id.to_string(),
        locator.site_id.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_nop_cache_always_loads() {
        let cache = NopCache;
        let calls = Cell::new(0);
        let loader = || {
            calls.set(calls.get() + 1);
            Ok(vec![1, 2, 3])
        };
        let key = Key::new("s").id("x");
        cache.get(&key, None, &loader).unwrap();
        cache.get(&key, None, &loader).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.flush(&[]), 0);
        assert_eq!(cache.stat(), CacheStat::default());
    }

    #[test]
    fn test_comment_scopes() {
        let scopes = comment_scopes(&Locator::new("remark", "https://x.com/p"), "u1");
        assert_eq!(scopes, vec!["https://x.com/p", "last", "u1", "remark"]);
    }
}

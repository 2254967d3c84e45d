//! Configuration for the engine, data service and cache.
//!
//! All configuration is plain structs with `Default` impls; binaries fill
//! them from command-line flags and environment variables.

use crate::constants::{DEFAULT_EDIT_DURATION_SECS, DEFAULT_MAX_COMMENT_SIZE};
use crate::error::{RemarkError, Result};
use crate::storage::RocksDbConfig;
use std::collections::HashMap;
use std::time::Duration;
use zeroize::Zeroizing;

// =============================================================================
// Engine Configuration
// =============================================================================

/// Configuration for the per-site storage engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// RocksDB tuning applied to every site database.
    pub rocksdb: RocksDbConfig,
    /// Fsync the WAL on every committed write transaction.
    pub sync_writes: bool,
}

impl EngineConfig {
    /// Creates a configuration tuned for a long-running server.
    pub fn for_server() -> Self {
        Self {
            rocksdb: RocksDbConfig::for_server(),
            sync_writes: true,
        }
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

/// Product rules enforced by the data service.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Key for IP address hashing.
    pub secret: Zeroizing<String>,
    /// How long after creation the author may edit a comment.
    pub edit_duration: Duration,
    /// Maximum comment size in runes.
    pub max_comment_size: usize,
    /// Posts older than this many days become read-only, 0 disables.
    pub read_only_age_days: u32,
    /// User allowed to vote for their own comments.
    pub dev_principal: Option<String>,
    /// Maximum number of votes per comment, 0 is unlimited.
    pub max_votes: usize,
    /// Reject downvotes that would push the score below zero.
    pub positive_score: bool,
    /// Picture assigned to users without one.
    pub default_avatar: String,
    /// Admin user ids per site.
    pub admins: HashMap<String, Vec<String>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            secret: Zeroizing::new(String::new()),
            edit_duration: Duration::from_secs(DEFAULT_EDIT_DURATION_SECS),
            max_comment_size: DEFAULT_MAX_COMMENT_SIZE,
            read_only_age_days: 0,
            dev_principal: None,
            max_votes: 0,
            positive_score: false,
            default_avatar: String::new(),
            admins: HashMap::new(),
        }
    }
}

impl ServiceConfig {
    /// Creates a configuration with the given hashing secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            ..Self::default()
        }
    }

    /// Rejects settings the service can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.secret.trim().is_empty() {
            return Err(RemarkError::config("secret is required for IP hashing"));
        }
        if self.max_comment_size == 0 {
            return Err(RemarkError::config("max comment size must be positive"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("secret", &"[REDACTED]")
            .field("edit_duration", &self.edit_duration)
            .field("max_comment_size", &self.max_comment_size)
            .field("read_only_age_days", &self.read_only_age_days)
            .field("dev_principal", &self.dev_principal)
            .field("max_votes", &self.max_votes)
            .field("positive_score", &self.positive_score)
            .field("default_avatar", &self.default_avatar)
            .field("admins", &self.admins)
            .finish()
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

/// Eviction limits for the loading cache. A zero limit is disabled.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub max_keys: usize,
    /// Values larger than this are returned but not stored.
    pub max_value_size: usize,
    /// Keys longer than this are never stored.
    pub max_key_size: usize,
    /// Maximum total stored bytes, oldest entries go first.
    pub max_cache_size: usize,
    /// Time to live of an entry, `None` keeps entries until evicted.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_keys: 1000,
            max_value_size: 0,
            max_key_size: 0,
            max_cache_size: 50 * 1024 * 1024, // 50MB
            ttl: None,
        }
    }
}

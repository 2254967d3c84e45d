//! # Remark42 - comment storage, moderation and caching core
//!
//! The storage and business-rule core of a self-hosted comment engine.
//! Comments are kept per site in an embedded RocksDB database, served
//! through a scope-invalidated loading cache, and masked per viewer before
//! they leave the process.
//!
//! ## Features
//!
//! - **Per-site storage**: one database per site with atomic multi-bucket writes
//! - **Business rules**: edit windows, voting, blocking, read-only posts
//! - **Reply trees**: flat comment lists assembled into sorted forests
//! - **Scoped caching**: writes invalidate only the views they affect
//! - **Backups**: JSON-lines export and import, optionally gzipped
//!
//! ## Examples
//!
//! ### Creating and reading a comment
//!
//! ```rust,no_run
//! use remark42::config::{EngineConfig, ServiceConfig};
//! use remark42::engine::RocksEngine;
//! use remark42::service::DataService;
//! use remark42::store::{Comment, Locator, SortOrder, User};
//! use std::sync::Arc;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = RocksEngine::new("/tmp/remark", &["radio-t".to_string()], EngineConfig::default())?;
//! let service = DataService::new(Arc::new(engine), ServiceConfig::with_secret("secret"));
//!
//! let locator = Locator::new("radio-t", "https://radio-t.com/blah1");
//! let created = service.create(Comment::new(locator.clone(), User::new("dev", "developer"), "test 123"))?;
//! let comments = service.find(&locator, SortOrder::Time)?;
//! assert_eq!(comments[0].id, created.id);
//! # Ok(())
//! # }
//! ```
//!
//! ### Caching a read
//!
//! ```rust,no_run
//! use remark42::cache::{comment_scopes, Key, LoadingCache, MemoryCache};
//! use remark42::config::CacheConfig;
//! use remark42::store::Locator;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = MemoryCache::new(CacheConfig::default());
//! let key = Key::new("radio-t").id("/api/v1/count?url=x").scopes(["radio-t", "x"]);
//! let bytes = cache.get(&key, None, &|| Ok(b"42".to_vec()))?;
//! assert_eq!(bytes, b"42");
//!
//! cache.flush(&comment_scopes(&Locator::new("radio-t", "x"), "dev"));
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod identity;
pub mod moderation;
pub mod render;
pub mod service;
pub mod storage;
pub mod store;
pub mod tree;
pub mod validation;

pub use error::{RemarkError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

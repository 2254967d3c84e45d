//! Shared RocksDB storage utilities.
//!
//! This module provides generic utilities for RocksDB-based storage. It
//! contains no comment-specific logic, just transactions over column
//! families.
//!
//! ## Transactions
//!
//! - `RocksDbHandle::read` opens a read transaction backed by a snapshot. Any
//!   number of readers run concurrently with each other and with a writer;
//!   a reader never observes a write that committed after it started.
//! - `RocksDbHandle::write` runs a closure inside a write transaction. Writers
//!   on one handle are serialized by a mutex, staged into a `WriteBatch` and
//!   committed with a single atomic write. Reads inside the transaction see
//!   the transaction's own staged writes. Nothing is written if the closure
//!   returns an error.

use crate::error::{RemarkError, Result};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
    SnapshotWithThreadMode, WriteBatch, WriteOptions,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, trace};

type Db = DBWithThreadMode<MultiThreaded>;

// =============================================================================
// RocksDB Configuration
// =============================================================================

/// Configuration for RocksDB storage.
///
/// One database is opened per site, so the defaults are kept small.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Maximum number of open files.
    pub max_open_files: i32,
    /// Number of log files to keep.
    pub keep_log_file_num: usize,
    /// Maximum WAL size in bytes.
    pub max_wal_size: u64,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Maximum number of write buffers.
    pub max_write_buffer_number: i32,
    /// Target file size for SST files.
    pub target_file_size_base: u64,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            max_open_files: 64,
            keep_log_file_num: 2,
            max_wal_size: 16 * 1024 * 1024,     // 16MB
            write_buffer_size: 8 * 1024 * 1024, // 8MB
            max_write_buffer_number: 2,
            target_file_size_base: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl RocksDbConfig {
    /// Creates a configuration optimized for server workloads.
    ///
    /// Uses larger buffers and more files for higher throughput.
    pub fn for_server() -> Self {
        Self {
            max_open_files: 256,
            keep_log_file_num: 3,
            max_wal_size: 64 * 1024 * 1024,      // 64MB
            write_buffer_size: 32 * 1024 * 1024, // 32MB
            max_write_buffer_number: 3,
            target_file_size_base: 64 * 1024 * 1024, // 64MB
        }
    }

    /// Builds RocksDB Options from this configuration.
    pub fn build_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_keep_log_file_num(self.keep_log_file_num);
        opts.set_max_total_wal_size(self.max_wal_size);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_max_write_buffer_number(self.max_write_buffer_number);
        opts.set_target_file_size_base(self.target_file_size_base);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }
}

// =============================================================================
// Key Generation Utilities
// =============================================================================

/// Creates a prefixed key with a separator.
///
/// Format: `{prefix}{separator}{suffix}`
///
/// Used to nest a child bucket under a parent key so that all children of a
/// parent are one contiguous key range.
pub fn prefixed_key(prefix: &[u8], separator: u8, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix);
    key.push(separator);
    key.extend_from_slice(suffix);
    key
}

/// Returns the smallest key greater than every key starting with `prefix`,
/// or `None` when no such key exists (empty or all-`0xFF` prefix).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| RemarkError::serialization(format!("Failed to serialize: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| RemarkError::serialization(format!("Failed to deserialize: {}", e)))
}

// =============================================================================
// Database Handle Wrapper
// =============================================================================

/// One RocksDB database with snapshot reads and serialized batch writes.
pub struct RocksDbHandle {
    db: Arc<Db>,
    write_lock: Mutex<()>,
    sync_writes: bool,
    path: PathBuf,
}

impl RocksDbHandle {
    /// Opens a RocksDB database with the given column families.
    pub fn open(
        db_path: impl AsRef<Path>,
        config: &RocksDbConfig,
        column_families: &[&str],
        sync_writes: bool,
    ) -> Result<Self> {
        let opts = config.build_options();
        let cf_opts = Options::default();

        let cf_descriptors: Vec<_> = column_families
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(*cf, cf_opts.clone()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, db_path.as_ref(), cf_descriptors)
            .map_err(|e| RemarkError::storage(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
            sync_writes,
            path: db_path.as_ref().to_path_buf(),
        })
    }

    /// Gets a column family handle.
    ///
    /// A missing column family means the database was not opened with the
    /// expected layout.
    pub fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| RemarkError::corruption(format!("Column family '{}' not found", name)))
    }

    /// Starts a read transaction over a consistent snapshot.
    pub fn read(&self) -> ReadTx<'_> {
        ReadTx {
            handle: self,
            snapshot: self.db.snapshot(),
        }
    }

    /// Runs `f` inside a write transaction and commits its writes atomically.
    ///
    /// Write transactions on the same handle are mutually exclusive. If `f`
    /// fails nothing is written.
    pub fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut WriteTx<'_>) -> Result<R>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| {
            error!(path = %self.path.display(), "write lock was poisoned, recovering");
            poisoned.into_inner()
        });

        let mut tx = WriteTx {
            handle: self,
            batch: WriteBatch::default(),
            overlay: HashMap::new(),
        };
        let result = f(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Flushes memtables and the WAL to disk.
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush_wal(true)
            .map_err(|e| RemarkError::storage(format!("Failed to flush WAL: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| RemarkError::storage(format!("Failed to flush: {}", e)))?;
        Ok(())
    }
}

impl std::fmt::Debug for RocksDbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbHandle")
            .field("path", &self.path)
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

// =============================================================================
// Read Transaction
// =============================================================================

/// Read-only view of a database at the instant it was opened.
pub struct ReadTx<'a> {
    handle: &'a RocksDbHandle,
    snapshot: SnapshotWithThreadMode<'a, Db>,
}

impl<'a> ReadTx<'a> {
    /// Loads raw bytes from the given key.
    pub fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.handle.cf(cf_name)?;

        match self.snapshot.get_cf(&cf, key) {
            Ok(Some(bytes)) => {
                trace!(
                    cf = cf_name,
                    key_len = key.len(),
                    value_bytes = bytes.len(),
                    "db_get_raw: found record"
                );
                Ok(Some(bytes))
            }
            Ok(None) => {
                trace!(cf = cf_name, key_len = key.len(), "db_get_raw: key not found");
                Ok(None)
            }
            Err(e) => Err(RemarkError::storage(format!("Failed to read: {}", e))),
        }
    }

    /// Loads and deserializes a value from the given key.
    pub fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(cf_name, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Checks if a key exists.
    pub fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get_raw(cf_name, key)?.is_some())
    }

    /// Iterates in key order over all entries with the given prefix.
    ///
    /// The callback receives (key, value) pairs and returns `Ok(true)` to
    /// continue or `Ok(false)` to stop. An error from the callback stops the
    /// iteration and is returned.
    pub fn prefix_iterate<F>(&self, cf_name: &str, prefix: &[u8], mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        let cf = self.handle.cf(cf_name)?;
        let mut iter = self.snapshot.raw_iterator_cf(&cf);
        iter.seek(prefix);

        let mut count: usize = 0;
        while iter.valid() {
            let (Some(key), Some(value)) = (iter.key(), iter.value()) else {
                break;
            };
            if !key.starts_with(prefix) {
                break;
            }
            count += 1;
            if !callback(key, value)? {
                break;
            }
            iter.next();
        }
        iter.status()
            .map_err(|e| RemarkError::storage(format!("Iterator error: {}", e)))?;

        debug!(
            cf = cf_name,
            prefix_len = prefix.len(),
            records_iterated = count,
            "db_prefix_iterate: completed iteration"
        );

        Ok(())
    }

    /// Iterates in reverse key order over all entries with the given prefix.
    pub fn prefix_iterate_rev<F>(
        &self,
        cf_name: &str,
        prefix: &[u8],
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        let cf = self.handle.cf(cf_name)?;
        let mut iter = self.snapshot.raw_iterator_cf(&cf);
        match prefix_upper_bound(prefix) {
            Some(upper) => {
                iter.seek_for_prev(&upper);
                if iter.valid() && iter.key() == Some(upper.as_slice()) {
                    iter.prev();
                }
            }
            None => iter.seek_to_last(),
        }

        let mut count: usize = 0;
        while iter.valid() {
            let (Some(key), Some(value)) = (iter.key(), iter.value()) else {
                break;
            };
            if !key.starts_with(prefix) {
                break;
            }
            count += 1;
            if !callback(key, value)? {
                break;
            }
            iter.prev();
        }
        iter.status()
            .map_err(|e| RemarkError::storage(format!("Iterator error: {}", e)))?;

        debug!(
            cf = cf_name,
            prefix_len = prefix.len(),
            records_iterated = count,
            "db_prefix_iterate_rev: completed reverse iteration"
        );

        Ok(())
    }

    /// Iterates over all entries in a column family.
    pub fn iterate_all<F>(&self, cf_name: &str, callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        self.prefix_iterate(cf_name, &[], callback)
    }
}

// =============================================================================
// Write Transaction
// =============================================================================

/// Staged writes of one write transaction.
///
/// The overlay mirrors the batch so reads inside the transaction observe
/// staged puts (`Some`) and deletes (`None`).
pub struct WriteTx<'a> {
    handle: &'a RocksDbHandle,
    batch: WriteBatch,
    overlay: HashMap<String, BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl<'a> WriteTx<'a> {
    /// Loads raw bytes from the given key, staged writes included.
    pub fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.overlay.get(cf_name).and_then(|m| m.get(key)) {
            trace!(cf = cf_name, key_len = key.len(), "tx_get_raw: staged record");
            return Ok(staged.clone());
        }
        let cf = self.handle.cf(cf_name)?;
        self.handle
            .db
            .get_cf(&cf, key)
            .map_err(|e| RemarkError::storage(format!("Failed to read: {}", e)))
    }

    /// Loads and deserializes a value from the given key.
    pub fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(cf_name, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Checks if a key exists.
    pub fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get_raw(cf_name, key)?.is_some())
    }

    /// Stages raw bytes at the given key.
    pub fn put_raw(&mut self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.handle.cf(cf_name)?;

        trace!(
            cf = cf_name,
            key_len = key.len(),
            value_bytes = value.len(),
            "tx_put_raw: staging raw bytes"
        );

        self.batch.put_cf(&cf, key, value);
        self.overlay
            .entry(cf_name.to_string())
            .or_default()
            .insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    /// Stages a serializable value at the given key.
    pub fn put<T: Serialize>(&mut self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = encode(value)?;
        self.put_raw(cf_name, key, &bytes)
    }

    /// Stages a delete of the given key.
    pub fn delete(&mut self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.handle.cf(cf_name)?;

        trace!(cf = cf_name, key_len = key.len(), "tx_delete: staging delete");

        self.batch.delete_cf(&cf, key);
        self.overlay
            .entry(cf_name.to_string())
            .or_default()
            .insert(key.to_vec(), None);
        Ok(())
    }

    /// Collects all entries with the given prefix, staged writes included,
    /// in key order.
    pub fn prefix_collect(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.handle.cf(cf_name)?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        let mut iter = self.handle.db.raw_iterator_cf(&cf);
        iter.seek(prefix);
        while iter.valid() {
            let (Some(key), Some(value)) = (iter.key(), iter.value()) else {
                break;
            };
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.to_vec(), value.to_vec());
            iter.next();
        }
        iter.status()
            .map_err(|e| RemarkError::storage(format!("Iterator error: {}", e)))?;

        if let Some(staged) = self.overlay.get(cf_name) {
            for (key, value) in staged.range(prefix.to_vec()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                match value {
                    Some(v) => merged.insert(key.clone(), v.clone()),
                    None => merged.remove(key),
                };
            }
        }

        debug!(
            cf = cf_name,
            prefix_len = prefix.len(),
            records_collected = merged.len(),
            "tx_prefix_collect: collected records"
        );

        Ok(merged.into_iter().collect())
    }

    /// Stages deletes of all entries with the given prefix.
    ///
    /// Returns the number of deleted entries.
    pub fn prefix_delete(&mut self, cf_name: &str, prefix: &[u8]) -> Result<usize> {
        let entries = self.prefix_collect(cf_name, prefix)?;
        for (key, _) in &entries {
            self.delete(cf_name, key)?;
        }

        debug!(
            cf = cf_name,
            prefix_len = prefix.len(),
            records_deleted = entries.len(),
            "tx_prefix_delete: deleted records with prefix"
        );

        Ok(entries.len())
    }

    fn commit(self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let ops = self.batch.len();
        let mut opts = WriteOptions::default();
        opts.set_sync(self.handle.sync_writes);
        self.handle
            .db
            .write_opt(self.batch, &opts)
            .map_err(|e| RemarkError::storage(format!("Failed to commit: {}", e)))?;

        debug!(ops = ops, "tx_commit: committed write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: u64,
    }

    fn create_test_db() -> (RocksDbHandle, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test_db");
        let config = RocksDbConfig::default();
        let db = RocksDbHandle::open(&db_path, &config, &["data", "meta"], false)
            .expect("Failed to open db");
        (db, temp_dir)
    }

    fn put_raw(db: &RocksDbHandle, cf: &str, key: &[u8], value: &[u8]) {
        db.write(|tx| tx.put_raw(cf, key, value)).unwrap();
    }

    #[test]
    fn test_prefixed_key() {
        let key = prefixed_key(b"prefix", 0, b"suffix");
        assert_eq!(key, b"prefix\0suffix");
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_upper_bound(b"a\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_upper_bound(b"\xff\xff"), None);
        assert_eq!(prefix_upper_bound(b""), None);
    }

    #[test]
    fn test_put_and_get() {
        let (db, _temp) = create_test_db();

        let data = TestData {
            name: "Test".to_string(),
            value: 12345,
        };

        db.write(|tx| tx.put("data", b"key1", &data)).unwrap();

        let loaded: TestData = db.read().get("data", b"key1").unwrap().unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_get_missing_key() {
        let (db, _temp) = create_test_db();
        let result: Option<TestData> = db.read().get("data", b"nonexistent").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_missing_column_family() {
        let (db, _temp) = create_test_db();
        let err = db.read().get_raw("nope", b"key").unwrap_err();
        assert!(matches!(err, RemarkError::Corruption(_)));
    }

    #[test]
    fn test_failed_transaction_writes_nothing() {
        let (db, _temp) = create_test_db();

        let result: Result<()> = db.write(|tx| {
            tx.put_raw("data", b"a", b"1")?;
            tx.put_raw("meta", b"b", b"2")?;
            Err(RemarkError::validation("abort"))
        });
        assert!(result.is_err());

        let read = db.read();
        assert!(!read.exists("data", b"a").unwrap());
        assert!(!read.exists("meta", b"b").unwrap());
    }

    #[test]
    fn test_read_your_writes() {
        let (db, _temp) = create_test_db();
        put_raw(&db, "data", b"p\0a", b"old");
        put_raw(&db, "data", b"p\0b", b"keep");

        db.write(|tx| {
            tx.put_raw("data", b"p\0a", b"new")?;
            tx.put_raw("data", b"p\0c", b"added")?;
            tx.delete("data", b"p\0b")?;

            assert_eq!(tx.get_raw("data", b"p\0a")?, Some(b"new".to_vec()));
            assert!(!tx.exists("data", b"p\0b")?);

            let entries = tx.prefix_collect("data", b"p\0")?;
            let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
            assert_eq!(keys, vec![b"p\0a".to_vec(), b"p\0c".to_vec()]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_snapshot_isolation() {
        let (db, _temp) = create_test_db();
        put_raw(&db, "data", b"key", b"v1");

        let before = db.read();
        put_raw(&db, "data", b"key", b"v2");

        assert_eq!(before.get_raw("data", b"key").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(db.read().get_raw("data", b"key").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_prefix_iterate() {
        let (db, _temp) = create_test_db();

        put_raw(&db, "data", b"prefix1\0a", b"data1");
        put_raw(&db, "data", b"prefix1\0b", b"data2");
        put_raw(&db, "data", b"prefix2\0a", b"data3");

        let mut found = Vec::new();
        db.read()
            .prefix_iterate("data", b"prefix1\0", |_, value| {
                found.push(value.to_vec());
                Ok(true)
            })
            .unwrap();

        assert_eq!(found, vec![b"data1".to_vec(), b"data2".to_vec()]);
    }

    #[test]
    fn test_prefix_iterate_rev() {
        let (db, _temp) = create_test_db();

        put_raw(&db, "data", b"a\0", b"skip");
        put_raw(&db, "data", b"a\x01", b"skip");
        put_raw(&db, "data", b"p\0a", b"1");
        put_raw(&db, "data", b"p\0b", b"2");
        put_raw(&db, "data", b"p\x01", b"skip");
        put_raw(&db, "data", b"q", b"skip");

        let mut found = Vec::new();
        db.read()
            .prefix_iterate_rev("data", b"p\0", |_, value| {
                found.push(value.to_vec());
                Ok(true)
            })
            .unwrap();
        assert_eq!(found, vec![b"2".to_vec(), b"1".to_vec()]);

        let mut all = 0;
        db.read()
            .prefix_iterate_rev("data", b"", |_, _| {
                all += 1;
                Ok(all < 3)
            })
            .unwrap();
        assert_eq!(all, 3);
    }

    #[test]
    fn test_callback_error_stops_iteration() {
        let (db, _temp) = create_test_db();
        put_raw(&db, "data", b"a", b"1");
        put_raw(&db, "data", b"b", b"2");

        let mut seen = 0;
        let result = db.read().iterate_all("data", |_, _| {
            seen += 1;
            Err(RemarkError::corruption("bad record"))
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_prefix_delete() {
        let (db, _temp) = create_test_db();

        put_raw(&db, "data", b"prefix1\0a", b"data1");
        put_raw(&db, "data", b"prefix1\0b", b"data2");
        put_raw(&db, "data", b"prefix2\0a", b"data3");

        let deleted = db.write(|tx| tx.prefix_delete("data", b"prefix1\0")).unwrap();
        assert_eq!(deleted, 2);

        let read = db.read();
        assert!(read.exists("data", b"prefix2\0a").unwrap());
        assert!(!read.exists("data", b"prefix1\0a").unwrap());
        let mut left = 0;
        read.iterate_all("data", |_, _| {
            left += 1;
            Ok(true)
        })
        .unwrap();
        assert_eq!(left, 1);
    }

    #[test]
    fn test_server_config() {
        let config = RocksDbConfig::for_server();
        assert_eq!(config.max_open_files, 256);
        assert_eq!(config.max_wal_size, 64 * 1024 * 1024);
    }
}

//! Storage utilities and abstractions.
//!
//! ## Modules
//!
//! - `rocksdb`: Generic RocksDB utilities (configuration, handle, transactions)

pub mod rocksdb;

pub use rocksdb::{
    prefix_upper_bound, prefixed_key, ReadTx, RocksDbConfig, RocksDbHandle, WriteTx,
};

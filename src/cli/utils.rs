//! Utility functions for CLI operations.

use crate::config::EngineConfig;
use crate::engine::RocksEngine;
use crate::validation::Validator;
use crate::Result;
use std::path::Path;

/// Opens the database of a single site under `root`.
pub fn open_engine(root: &Path, site_id: &str) -> Result<RocksEngine> {
    Validator::validate_site_id(site_id)?;
    RocksEngine::new(root, &[site_id.to_string()], EngineConfig::default())
}

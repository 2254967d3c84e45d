//! Command implementations for the maintenance CLI.

use crate::{backup, engine::Engine, Result};
use std::io::{self, BufReader};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Execute export command
pub fn export(engine: &dyn Engine, site_id: &str, file: Option<&Path>) -> Result<usize> {
    let exported = match file {
        Some(path) => backup::export_to_file(engine, site_id, path)?,
        None => backup::export(engine, site_id, io::stdout().lock())?,
    };
    info!(site = site_id, comments = exported, "Exported site");
    Ok(exported)
}

/// Execute import command
pub fn import(engine: &dyn Engine, site_id: &str, file: &Path) -> Result<usize> {
    let imported = if file == Path::new("-") {
        backup::import(engine, site_id, BufReader::new(io::stdin().lock()))?
    } else {
        backup::import_from_file(engine, site_id, file)?
    };
    info!(site = site_id, comments = imported, file = %file.display(), "Imported site");
    Ok(imported)
}

/// Execute wipe command
pub fn wipe(engine: &dyn Engine, site_id: &str) -> Result<()> {
    engine.delete_all(site_id)?;
    info!(site = site_id, "Wiped all comments");
    Ok(())
}

/// Execute delete-user command
pub fn delete_user(engine: &dyn Engine, site_id: &str, user_id: &str) -> Result<()> {
    engine.delete_user(site_id, user_id)?;
    info!(site = site_id, user_id = user_id, "Deleted user");
    Ok(())
}

/// Execute block command
pub fn block(engine: &dyn Engine, site_id: &str, user_id: &str, ttl_secs: u64, status: bool) -> Result<()> {
    engine.set_block(site_id, user_id, status, Duration::from_secs(ttl_secs))?;
    info!(
        site = site_id,
        user_id = user_id,
        blocked = status,
        ttl_secs = ttl_secs,
        "Updated user block"
    );
    Ok(())
}

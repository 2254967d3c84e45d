//! Site export and import as JSON lines.
//!
//! One comment per line, posts in url order and comments of a post in
//! creation order, so parents always precede their replies. File mode wraps
//! the stream in gzip.

use crate::engine::Engine;
use crate::error::{RemarkError, Result};
use crate::store::{Comment, Locator, SortOrder};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Writes every comment of `site_id` to `writer`. Returns the number of
/// exported comments.
pub fn export<W: Write>(engine: &dyn Engine, site_id: &str, mut writer: W) -> Result<usize> {
    let mut exported = 0;
    for url in engine.urls(site_id)? {
        let comments = engine.find(&Locator::new(site_id, url.as_str()), SortOrder::Time)?;
        for comment in &comments {
            serde_json::to_writer(&mut writer, comment)?;
            writer.write_all(b"\n")?;
        }
        debug!(site = %site_id, url = %url, comments = comments.len(), "exported post");
        exported += comments.len();
    }
    writer.flush()?;
    info!(site = %site_id, comments = exported, "export finished");
    Ok(exported)
}

/// Exports `site_id` into a gzipped file at `path`.
pub fn export_to_file(engine: &dyn Engine, site_id: &str, path: &Path) -> Result<usize> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let exported = export(engine, site_id, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(exported)
}

/// Replaces all comments of `site_id` with the ones read from `reader`.
/// Returns the number of imported comments.
///
/// The site is wiped before the first line is read. Every comment is moved
/// to `site_id` whatever site it was exported from.
pub fn import<R: BufRead>(engine: &dyn Engine, site_id: &str, reader: R) -> Result<usize> {
    engine.delete_all(site_id)?;

    let mut imported = 0;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut comment: Comment = serde_json::from_str(&line)
            .map_err(|e| RemarkError::validation(format!("line {}: {}", n + 1, e)))?;
        comment.locator.site_id = site_id.to_string();
        engine.create(&comment).map_err(|e| match e {
            RemarkError::Validation(msg) => {
                RemarkError::validation(format!("line {}: {}", n + 1, msg))
            }
            other => other,
        })?;
        imported += 1;
    }

    info!(site = %site_id, comments = imported, "import finished");
    Ok(imported)
}

/// Imports from a file, plain or gzipped.
pub fn import_from_file(engine: &dyn Engine, site_id: &str, path: &Path) -> Result<usize> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    let file = File::open(path)?;

    if read == GZIP_MAGIC.len() && magic == GZIP_MAGIC {
        debug!(path = %path.display(), "importing gzipped backup");
        import(engine, site_id, BufReader::new(GzDecoder::new(file)))
    } else {
        import(engine, site_id, BufReader::new(file))
    }
}

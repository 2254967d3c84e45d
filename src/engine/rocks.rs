//! RocksDB-backed engine with one database per site.

use super::keys::{
    format_time, make_ref, parse_count, parse_ref, parse_time, post_key, post_prefix,
    split_nested, ts_key, user_key, user_prefix, ALL_BUCKETS, CF_BLOCKS, CF_COUNTS, CF_LAST,
    CF_IDS, CF_POSTS, CF_READONLY, CF_USERS, CF_VERIFIED, WIPED_BUCKETS,
};
use super::{sort_comments, Engine};
use crate::config::EngineConfig;
use crate::constants::{LAST_LIMIT, USER_LIMIT};
use crate::error::{RemarkError, Result};
use crate::storage::{ReadTx, RocksDbHandle, WriteTx};
use crate::store::{BlockedUser, Comment, DeleteMode, Locator, PostInfo, SortOrder};
use crate::validation::Validator;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Engine storing each site in its own RocksDB database under a root
/// directory.
pub struct RocksEngine {
    root: PathBuf,
    config: EngineConfig,
    sites: RwLock<HashMap<String, Arc<RocksDbHandle>>>,
}

impl RocksEngine {
    /// Opens (creating if needed) the databases of the given sites.
    pub fn new(root: impl AsRef<Path>, sites: &[String], config: EngineConfig) -> Result<Self> {
        let engine = Self {
            root: root.as_ref().to_path_buf(),
            config,
            sites: RwLock::new(HashMap::new()),
        };
        std::fs::create_dir_all(&engine.root)?;
        for site in sites {
            engine.open_site(site)?;
        }
        Ok(engine)
    }

    /// Opens a site's database, a no-op if it is already open.
    pub fn open_site(&self, site_id: &str) -> Result<()> {
        Validator::validate_site_id(site_id)?;
        let mut sites = self.sites.write().unwrap_or_else(|poisoned| {
            error!("sites lock was poisoned on write, recovering");
            poisoned.into_inner()
        });
        if sites.contains_key(site_id) {
            return Ok(());
        }

        let path = self.root.join(site_id);
        let handle = RocksDbHandle::open(
            &path,
            &self.config.rocksdb,
            ALL_BUCKETS,
            self.config.sync_writes,
        )?;
        info!(site = site_id, path = %path.display(), "opened site database");
        sites.insert(site_id.to_string(), Arc::new(handle));
        Ok(())
    }

    fn site(&self, site_id: &str) -> Result<Arc<RocksDbHandle>> {
        let sites = self.sites.read().unwrap_or_else(|poisoned| {
            error!("sites lock was poisoned on read, recovering");
            poisoned.into_inner()
        });
        sites
            .get(site_id)
            .cloned()
            .ok_or_else(|| RemarkError::not_found(format!("site {}", site_id)))
    }
}

impl std::fmt::Debug for RocksEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksEngine")
            .field("root", &self.root)
            .field("sites", &self.sites())
            .finish()
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Block expiry used for permanent blocks.
fn permanent_block() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn read_comment(tx: &ReadTx<'_>, url: &str, id: &str) -> Result<Option<Comment>> {
    tx.get(CF_POSTS, &post_key(url, id))
}

/// Resolves an index reference to its comment. A dangling reference is
/// logged and skipped.
fn resolve_ref(tx: &ReadTx<'_>, reference: &[u8]) -> Result<Option<Comment>> {
    let (url, id) = parse_ref(reference)?;
    let comment = read_comment(tx, &url, &id)?;
    if comment.is_none() {
        warn!(url = %url, id = %id, "reference points to a missing comment");
    }
    Ok(comment)
}

fn read_count(tx: &ReadTx<'_>, url: &str) -> Result<usize> {
    match tx.get_raw(CF_COUNTS, url.as_bytes())? {
        Some(bytes) => parse_count(&bytes),
        None => Ok(0),
    }
}

fn adjust_count(tx: &mut WriteTx<'_>, url: &str, delta: i64) -> Result<()> {
    let current = match tx.get_raw(CF_COUNTS, url.as_bytes())? {
        Some(bytes) => parse_count(&bytes)?,
        None => 0,
    };
    let updated = if delta >= 0 {
        current.saturating_add(delta as usize)
    } else {
        let dec = delta.unsigned_abs() as usize;
        if dec > current {
            warn!(url = url, current = current, "post count would go negative, clamping");
        }
        current.saturating_sub(dec)
    };
    tx.put_raw(CF_COUNTS, url.as_bytes(), updated.to_string().as_bytes())
}

/// Removes the `last` entry of a comment if it still points to it.
fn unlink_last(tx: &mut WriteTx<'_>, comment: &Comment) -> Result<()> {
    let key = ts_key(&comment.timestamp);
    let expected = make_ref(&comment.locator.url, &comment.id);
    if let Some(current) = tx.get_raw(CF_LAST, key.as_bytes())? {
        if current == expected.as_bytes() {
            tx.delete(CF_LAST, key.as_bytes())?;
        }
    }
    Ok(())
}

/// Tombstones a comment inside a write transaction. Returns false if the
/// comment was already deleted before.
fn tombstone(tx: &mut WriteTx<'_>, comment: &mut Comment, mode: DeleteMode) -> Result<bool> {
    let was_deleted = comment.deleted;
    comment.set_deleted(mode);
    tx.put(
        CF_POSTS,
        &post_key(&comment.locator.url, &comment.id),
        comment,
    )?;
    unlink_last(tx, comment)?;
    if !was_deleted {
        adjust_count(tx, &comment.locator.url, -1)?;
    }
    Ok(!was_deleted)
}

/// Non-deleted comments referenced by a user's activity index, newest first.
fn user_comments(tx: &ReadTx<'_>, user_id: &str) -> Result<Option<Vec<Comment>>> {
    let mut entries = 0usize;
    let mut comments = Vec::new();
    tx.prefix_iterate_rev(CF_USERS, &user_prefix(user_id), |_, value| {
        entries += 1;
        if let Some(c) = resolve_ref(tx, value)? {
            if !c.deleted {
                comments.push(c);
            }
        }
        Ok(true)
    })?;
    if entries == 0 {
        return Ok(None);
    }
    Ok(Some(comments))
}

// =============================================================================
// Engine Implementation
// =============================================================================

impl Engine for RocksEngine {
    fn create(&self, comment: &Comment) -> Result<String> {
        Validator::validate_locator(&comment.locator)?;
        Validator::validate_user_id(&comment.user.id)?;
        if comment.id.is_empty() {
            return Err(RemarkError::validation("comment id cannot be empty"));
        }
        Validator::validate_comment_id(&comment.id)?;
        Validator::validate_timestamp(&comment.timestamp)?;

        let db = self.site(&comment.locator.site_id)?;
        let url = comment.locator.url.as_str();

        let stored = db.write(|tx| {
            let key = post_key(url, &comment.id);
            if tx.exists(CF_IDS, comment.id.as_bytes())? || tx.exists(CF_POSTS, &key)? {
                return Err(RemarkError::duplicate(format!(
                    "comment {} already exists on site {}",
                    comment.id, comment.locator.site_id
                )));
            }
            if !comment.parent_id.is_empty()
                && !tx.exists(CF_POSTS, &post_key(url, &comment.parent_id))?
            {
                return Err(RemarkError::validation(format!(
                    "parent comment {} not found in {}",
                    comment.parent_id, url
                )));
            }

            // Advance the timestamp until both time-keyed indexes have a
            // free slot, so index keys always match the stored time.
            let mut c = comment.clone();
            let mut ts = ts_key(&c.timestamp);
            while tx.exists(CF_LAST, ts.as_bytes())?
                || tx.exists(CF_USERS, &user_key(&c.user.id, &ts))?
            {
                c.timestamp += chrono::Duration::nanoseconds(1);
                ts = ts_key(&c.timestamp);
            }

            let reference = make_ref(url, &c.id);
            tx.put(CF_POSTS, &key, &c)?;
            tx.put_raw(CF_IDS, c.id.as_bytes(), url.as_bytes())?;
            tx.put_raw(CF_USERS, &user_key(&c.user.id, &ts), reference.as_bytes())?;
            if !c.deleted {
                tx.put_raw(CF_LAST, ts.as_bytes(), reference.as_bytes())?;
                adjust_count(tx, url, 1)?;
            }
            Ok(c)
        })?;

        debug!(
            site = %stored.locator.site_id,
            url = %stored.locator.url,
            id = %stored.id,
            "created comment"
        );
        Ok(stored.id)
    }

    fn get(&self, locator: &Locator, id: &str) -> Result<Comment> {
        let db = self.site(&locator.site_id)?;
        let tx = db.read();
        read_comment(&tx, &locator.url, id)?.ok_or_else(|| {
            RemarkError::not_found(format!("comment {} in {}", id, locator.url))
        })
    }

    fn update(
        &self,
        locator: &Locator,
        id: &str,
        change: &mut dyn FnMut(&mut Comment) -> Result<()>,
    ) -> Result<Comment> {
        let db = self.site(&locator.site_id)?;
        let key = post_key(&locator.url, id);

        db.write(|tx| {
            let stored: Comment = tx.get(CF_POSTS, &key)?.ok_or_else(|| {
                RemarkError::not_found(format!("comment {} in {}", id, locator.url))
            })?;
            if stored.deleted {
                return Err(RemarkError::forbidden(format!("comment {} is deleted", id)));
            }

            let mut updated = stored.clone();
            change(&mut updated)?;
            updated.id = stored.id;
            updated.locator = stored.locator;
            updated.parent_id = stored.parent_id;
            updated.timestamp = stored.timestamp;
            updated.user = stored.user;

            if updated.deleted {
                updated.deleted = false;
                tombstone(tx, &mut updated, DeleteMode::Soft)?;
            } else {
                tx.put(CF_POSTS, &key, &updated)?;
            }
            Ok(updated)
        })
    }

    fn find(&self, locator: &Locator, sort: SortOrder) -> Result<Vec<Comment>> {
        let db = self.site(&locator.site_id)?;
        let tx = db.read();

        let mut comments = Vec::new();
        tx.prefix_iterate(CF_POSTS, &post_prefix(&locator.url), |_, value| {
            let comment: Comment = serde_json::from_slice(value)?;
            comments.push(comment);
            Ok(true)
        })?;

        sort_comments(&mut comments, sort);
        Ok(comments)
    }

    fn last(
        &self,
        site_id: &str,
        max: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Comment>> {
        let db = self.site(site_id)?;
        let tx = db.read();
        let max = if max == 0 || max > LAST_LIMIT {
            LAST_LIMIT
        } else {
            max
        };
        let since_key = since.map(|ts| ts_key(&ts));

        let mut comments = Vec::with_capacity(max.min(64));
        tx.prefix_iterate_rev(CF_LAST, &[], |key, value| {
            if let Some(since_key) = &since_key {
                if key <= since_key.as_bytes() {
                    return Ok(false);
                }
            }
            if let Some(c) = resolve_ref(&tx, value)? {
                if !c.deleted {
                    comments.push(c);
                }
            }
            Ok(comments.len() < max)
        })?;

        Ok(comments)
    }

    fn user(
        &self,
        site_id: &str,
        user_id: &str,
        limit: usize,
        skip: usize,
    ) -> Result<(Vec<Comment>, usize)> {
        let db = self.site(site_id)?;
        let tx = db.read();
        let limit = if limit == 0 || limit > USER_LIMIT {
            USER_LIMIT
        } else {
            limit
        };

        let comments = user_comments(&tx, user_id)?
            .ok_or_else(|| RemarkError::not_found(format!("no comments for user {}", user_id)))?;
        let total = comments.len();
        let page = comments.into_iter().skip(skip).take(limit).collect();
        Ok((page, total))
    }

    fn user_count(&self, site_id: &str, user_id: &str) -> Result<usize> {
        let db = self.site(site_id)?;
        let tx = db.read();
        user_comments(&tx, user_id)?
            .map(|comments| comments.len())
            .ok_or_else(|| RemarkError::not_found(format!("no comments for user {}", user_id)))
    }

    fn count(&self, locator: &Locator) -> Result<usize> {
        let db = self.site(&locator.site_id)?;
        let tx = db.read();
        read_count(&tx, &locator.url)
    }

    fn list(&self, site_id: &str, limit: usize, skip: usize) -> Result<Vec<PostInfo>> {
        let db = self.site(site_id)?;
        let tx = db.read();

        // url -> (first, last) over live comments
        let mut spans: BTreeMap<String, (DateTime<Utc>, DateTime<Utc>)> = BTreeMap::new();
        tx.iterate_all(CF_POSTS, |key, value| {
            let (url, _) = split_nested(key)?;
            let comment: Comment = serde_json::from_slice(value)?;
            if comment.deleted {
                return Ok(true);
            }
            let ts = comment.timestamp;
            spans
                .entry(url.to_string())
                .and_modify(|(first, last)| {
                    if ts < *first {
                        *first = ts;
                    }
                    if ts > *last {
                        *last = ts;
                    }
                })
                .or_insert((ts, ts));
            Ok(true)
        })?;

        let mut posts = Vec::with_capacity(spans.len());
        for (url, (first, last)) in spans {
            let count = read_count(&tx, &url)?;
            let read_only = tx.exists(CF_READONLY, url.as_bytes())?;
            posts.push(PostInfo {
                url,
                count,
                read_only,
                first_ts: Some(first),
                last_ts: Some(last),
            });
        }
        posts.sort_by(|a, b| b.last_ts.cmp(&a.last_ts));

        let limit = if limit == 0 { posts.len() } else { limit };
        Ok(posts.into_iter().skip(skip).take(limit).collect())
    }

    fn urls(&self, site_id: &str) -> Result<Vec<String>> {
        let db = self.site(site_id)?;
        let tx = db.read();
        let mut urls: BTreeSet<String> = BTreeSet::new();
        tx.iterate_all(CF_POSTS, |key, _| {
            let (url, _) = split_nested(key)?;
            if !urls.contains(url) {
                urls.insert(url.to_string());
            }
            Ok(true)
        })?;
        Ok(urls.into_iter().collect())
    }

    fn info(&self, locator: &Locator, read_only_age_days: u32) -> Result<PostInfo> {
        let db = self.site(&locator.site_id)?;
        let tx = db.read();

        // first and last over live comments, as in `list`
        let mut span: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        tx.prefix_iterate(CF_POSTS, &post_prefix(&locator.url), |_, value| {
            let comment: Comment = serde_json::from_slice(value)?;
            if comment.deleted {
                return Ok(true);
            }
            let ts = comment.timestamp;
            span = Some(match span {
                Some((first, last)) => (first.min(ts), last.max(ts)),
                None => (ts, ts),
            });
            Ok(true)
        })?;

        let (first, last) = span.ok_or_else(|| {
            RemarkError::not_found(format!("can't get info for {}, no comments", locator.url))
        })?;

        let mut read_only = tx.exists(CF_READONLY, locator.url.as_bytes())?;
        if read_only_age_days > 0 {
            let age = chrono::Duration::days(i64::from(read_only_age_days));
            read_only = read_only || first + age < Utc::now();
        }

        Ok(PostInfo {
            url: locator.url.clone(),
            count: read_count(&tx, &locator.url)?,
            read_only,
            first_ts: Some(first),
            last_ts: Some(last),
        })
    }

    fn set_block(&self, site_id: &str, user_id: &str, status: bool, ttl: Duration) -> Result<()> {
        Validator::validate_user_id(user_id)?;
        let db = self.site(site_id)?;

        if !status {
            db.write(|tx| tx.delete(CF_BLOCKS, user_id.as_bytes()))?;
            info!(site = site_id, user = user_id, "user unblocked");
            return Ok(());
        }

        let until = if ttl.is_zero() {
            permanent_block()
        } else {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
                .unwrap_or_else(permanent_block)
        };
        db.write(|tx| tx.put_raw(CF_BLOCKS, user_id.as_bytes(), format_time(&until).as_bytes()))?;
        info!(site = site_id, user = user_id, until = %until, "user blocked");
        Ok(())
    }

    fn is_blocked(&self, site_id: &str, user_id: &str) -> Result<bool> {
        let db = self.site(site_id)?;
        let tx = db.read();
        match tx.get_raw(CF_BLOCKS, user_id.as_bytes())? {
            Some(value) => Ok(parse_time(&value)? > Utc::now()),
            None => Ok(false),
        }
    }

    fn blocked(&self, site_id: &str) -> Result<Vec<BlockedUser>> {
        let db = self.site(site_id)?;
        let tx = db.read();
        let now = Utc::now();

        let mut active = Vec::new();
        tx.iterate_all(CF_BLOCKS, |key, value| {
            let until = parse_time(value)?;
            if until > now {
                let id = String::from_utf8_lossy(key).into_owned();
                active.push((id, until));
            }
            Ok(true)
        })?;

        let mut users = Vec::with_capacity(active.len());
        for (id, until) in active {
            // display name from the user's latest comment
            let mut name = None;
            tx.prefix_iterate_rev(CF_USERS, &user_prefix(&id), |_, value| {
                if let Some(c) = resolve_ref(&tx, value)? {
                    name = Some(c.user.name);
                }
                Ok(name.is_none())
            })?;
            users.push(BlockedUser {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                until,
            });
        }
        Ok(users)
    }

    fn set_read_only(&self, locator: &Locator, status: bool) -> Result<()> {
        Validator::validate_locator(locator)?;
        let db = self.site(&locator.site_id)?;
        db.write(|tx| {
            if status {
                tx.put_raw(CF_READONLY, locator.url.as_bytes(), b"1")
            } else {
                tx.delete(CF_READONLY, locator.url.as_bytes())
            }
        })?;
        info!(locator = %locator, read_only = status, "post read-only status changed");
        Ok(())
    }

    fn is_read_only(&self, locator: &Locator) -> Result<bool> {
        let db = self.site(&locator.site_id)?;
        let tx = db.read();
        tx.exists(CF_READONLY, locator.url.as_bytes())
    }

    fn set_verified(&self, site_id: &str, user_id: &str, status: bool) -> Result<()> {
        Validator::validate_user_id(user_id)?;
        let db = self.site(site_id)?;
        db.write(|tx| {
            if status {
                tx.put_raw(
                    CF_VERIFIED,
                    user_id.as_bytes(),
                    format_time(&Utc::now()).as_bytes(),
                )
            } else {
                tx.delete(CF_VERIFIED, user_id.as_bytes())
            }
        })?;
        info!(site = site_id, user = user_id, verified = status, "user verification changed");
        Ok(())
    }

    fn is_verified(&self, site_id: &str, user_id: &str) -> Result<bool> {
        let db = self.site(site_id)?;
        let tx = db.read();
        tx.exists(CF_VERIFIED, user_id.as_bytes())
    }

    fn verified(&self, site_id: &str) -> Result<Vec<String>> {
        let db = self.site(site_id)?;
        let tx = db.read();
        let mut ids = Vec::new();
        tx.iterate_all(CF_VERIFIED, |key, _| {
            ids.push(String::from_utf8_lossy(key).into_owned());
            Ok(true)
        })?;
        Ok(ids)
    }

    fn delete(&self, locator: &Locator, id: &str, mode: DeleteMode) -> Result<()> {
        let db = self.site(&locator.site_id)?;
        let key = post_key(&locator.url, id);

        db.write(|tx| {
            let mut comment: Comment = tx.get(CF_POSTS, &key)?.ok_or_else(|| {
                RemarkError::not_found(format!("comment {} in {}", id, locator.url))
            })?;
            tombstone(tx, &mut comment, mode)
        })?;

        debug!(locator = %locator, id = id, mode = %mode, "deleted comment");
        Ok(())
    }

    fn delete_all(&self, site_id: &str) -> Result<()> {
        let db = self.site(site_id)?;
        let removed = db.write(|tx| {
            let mut removed = 0;
            for bucket in WIPED_BUCKETS {
                removed += tx.prefix_delete(bucket, &[])?;
            }
            Ok(removed)
        })?;
        info!(site = site_id, records = removed, "site wiped");
        Ok(())
    }

    fn delete_user(&self, site_id: &str, user_id: &str) -> Result<()> {
        let db = self.site(site_id)?;
        let prefix = user_prefix(user_id);

        let masked = db.write(|tx| {
            let entries = tx.prefix_collect(CF_USERS, &prefix)?;
            if entries.is_empty() {
                return Err(RemarkError::not_found(format!(
                    "no comments for user {}",
                    user_id
                )));
            }

            let mut masked = 0;
            for (_, reference) in &entries {
                let (url, id) = parse_ref(reference)?;
                let key = post_key(&url, &id);
                let Some(mut comment) = tx.get::<Comment>(CF_POSTS, &key)? else {
                    warn!(url = %url, id = %id, "reference points to a missing comment");
                    continue;
                };
                tombstone(tx, &mut comment, DeleteMode::Hard)?;
                masked += 1;
            }
            tx.prefix_delete(CF_USERS, &prefix)?;
            Ok(masked)
        })?;

        info!(site = site_id, user = user_id, comments = masked, "user deleted");
        Ok(())
    }

    fn sites(&self) -> Vec<String> {
        let sites = self.sites.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = sites.keys().cloned().collect();
        names.sort();
        names
    }

    fn close(&self) -> Result<()> {
        let mut sites = self.sites.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (site, db) in sites.iter() {
            if let Err(e) = db.flush() {
                error!(site = %site, error = %e, "failed to flush site database");
            }
        }
        sites.clear();
        info!("engine closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::User;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const SITE: &str = "radio-t";

    fn create_engine() -> (RocksEngine, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let engine = RocksEngine::new(
            temp_dir.path(),
            &[SITE.to_string()],
            EngineConfig::default(),
        )
        .expect("Failed to open engine");
        (engine, temp_dir)
    }

    fn comment(id: &str, url: &str, user: &str, secs: i64) -> Comment {
        let mut c = Comment::new(Locator::new(SITE, url), User::new(user, user), "text");
        c.id = id.to_string();
        c.text = format!("<p>{}</p>\n", id);
        c.timestamp = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        c
    }

    #[test]
    fn test_create_and_get() {
        let (engine, _temp) = create_engine();
        let c = comment("c1", "https://x.com/1", "u1", 0);

        let id = engine.create(&c).unwrap();
        assert_eq!(id, "c1");

        let loaded = engine.get(&c.locator, "c1").unwrap();
        assert_eq!(loaded, c);
        assert_eq!(engine.count(&c.locator).unwrap(), 1);
    }

    #[test]
    fn test_unknown_site() {
        let (engine, _temp) = create_engine();
        let mut c = comment("c1", "https://x.com/1", "u1", 0);
        c.locator.site_id = "other".to_string();
        assert!(matches!(engine.create(&c), Err(RemarkError::NotFound(_))));
        assert!(matches!(engine.count(&c.locator), Err(RemarkError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_leaves_indexes_untouched() {
        let (engine, _temp) = create_engine();
        let c = comment("c1", "https://x.com/1", "u1", 0);
        engine.create(&c).unwrap();

        let dup = comment("c1", "https://x.com/1", "u1", 10);
        assert!(matches!(engine.create(&dup), Err(RemarkError::Duplicate(_))));
        assert_eq!(engine.count(&c.locator).unwrap(), 1);
        assert_eq!(engine.last(SITE, 10, None).unwrap().len(), 1);
    }

    #[test]
    fn test_parent_must_exist_in_post() {
        let (engine, _temp) = create_engine();
        engine.create(&comment("p1", "https://x.com/1", "u1", 0)).unwrap();

        let orphan = comment("c2", "https://x.com/2", "u1", 1).reply_to("p1");
        assert!(matches!(engine.create(&orphan), Err(RemarkError::Validation(_))));

        let reply = comment("c3", "https://x.com/1", "u1", 2).reply_to("p1");
        assert!(engine.create(&reply).is_ok());
    }

    #[test]
    fn test_timestamp_collision_advances() {
        let (engine, _temp) = create_engine();
        engine.create(&comment("c1", "https://x.com/1", "u1", 0)).unwrap();
        engine.create(&comment("c2", "https://x.com/1", "u2", 0)).unwrap();

        let locator = Locator::new(SITE, "https://x.com/1");
        let c1 = engine.get(&locator, "c1").unwrap();
        let c2 = engine.get(&locator, "c2").unwrap();
        assert_eq!(c2.timestamp - c1.timestamp, chrono::Duration::nanoseconds(1));
        assert_eq!(engine.last(SITE, 0, None).unwrap().len(), 2);
    }

    #[test]
    fn test_update_preserves_immutable_fields() {
        let (engine, _temp) = create_engine();
        let c = comment("c1", "https://x.com/1", "u1", 0);
        engine.create(&c).unwrap();

        let stored = engine
            .update(&c.locator, "c1", &mut |update| {
                update.text = "<p>new</p>\n".to_string();
                update.pin = true;
                update.user = User::new("intruder", "intruder");
                update.timestamp = Utc::now();
                update.parent_id = "other".to_string();
                Ok(())
            })
            .unwrap();
        assert_eq!(stored.text, "<p>new</p>\n");
        assert!(stored.pin);
        assert_eq!(stored.user.id, "u1");
        assert_eq!(stored.timestamp, c.timestamp);
        assert!(stored.parent_id.is_empty());
        assert_eq!(engine.get(&c.locator, "c1").unwrap(), stored);
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let (engine, _temp) = create_engine();
        let c = comment("c1", "https://x.com/1", "u1", 0);
        engine.create(&c).unwrap();

        let result = engine.update(&c.locator, "c1", &mut |update| {
            update.pin = true;
            Err(RemarkError::forbidden("no"))
        });
        assert!(matches!(result, Err(RemarkError::Forbidden(_))));
        assert!(!engine.get(&c.locator, "c1").unwrap().pin);
    }

    #[test]
    fn test_update_rejects_tombstones() {
        let (engine, _temp) = create_engine();
        let c = comment("c1", "https://x.com/1", "u1", 0);
        engine.create(&c).unwrap();
        engine.delete(&c.locator, "c1", DeleteMode::Soft).unwrap();

        let result = engine.update(&c.locator, "c1", &mut |update| {
            update.text = "<p>back</p>\n".to_string();
            update.deleted = false;
            Ok(())
        });
        assert!(matches!(result, Err(RemarkError::Forbidden(_))));
        let stored = engine.get(&c.locator, "c1").unwrap();
        assert!(stored.deleted);
        assert!(stored.text.is_empty());
    }

    #[test]
    fn test_update_can_soft_delete() {
        let (engine, _temp) = create_engine();
        let c = comment("c1", "https://x.com/1", "u1", 0);
        engine.create(&c).unwrap();

        let stored = engine
            .update(&c.locator, "c1", &mut |update| {
                update.deleted = true;
                Ok(())
            })
            .unwrap();
        assert!(stored.deleted);
        assert!(stored.text.is_empty());
        assert_eq!(stored.user.id, "u1");
        assert_eq!(engine.count(&c.locator).unwrap(), 0);
        assert!(engine.last(SITE, 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_ids_are_unique_across_posts() {
        let (engine, _temp) = create_engine();
        engine.create(&comment("c1", "https://x.com/1", "u1", 0)).unwrap();

        let elsewhere = comment("c1", "https://x.com/2", "u2", 5);
        assert!(matches!(engine.create(&elsewhere), Err(RemarkError::Duplicate(_))));
        assert!(engine
            .find(&Locator::new(SITE, "https://x.com/2"), SortOrder::Time)
            .unwrap()
            .is_empty());
        assert_eq!(engine.last(SITE, 0, None).unwrap().len(), 1);

        // a wipe frees the id again
        engine.delete_all(SITE).unwrap();
        assert!(engine.create(&elsewhere).is_ok());
    }

    #[test]
    fn test_create_rejects_timestamp_out_of_key_range() {
        let (engine, _temp) = create_engine();
        let mut c = comment("c1", "https://x.com/1", "u1", 0);
        c.timestamp = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(engine.create(&c), Err(RemarkError::Validation(_))));
        assert_eq!(engine.count(&c.locator).unwrap(), 0);
    }

    #[test]
    fn test_find_unknown_post_is_empty() {
        let (engine, _temp) = create_engine();
        let found = engine
            .find(&Locator::new(SITE, "https://x.com/none"), SortOrder::Time)
            .unwrap();
        assert!(found.is_empty());
        assert!(engine
            .get(&Locator::new(SITE, "https://x.com/none"), "c1")
            .is_err());
    }

    #[test]
    fn test_find_does_not_leak_prefix_posts() {
        let (engine, _temp) = create_engine();
        engine.create(&comment("c1", "https://x.com/1", "u1", 0)).unwrap();
        engine.create(&comment("c2", "https://x.com/10", "u1", 1)).unwrap();

        let found = engine
            .find(&Locator::new(SITE, "https://x.com/1"), SortOrder::Time)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c1");
    }

    #[test]
    fn test_soft_delete() {
        let (engine, _temp) = create_engine();
        let c1 = comment("c1", "https://x.com/1", "u1", 0);
        engine.create(&c1).unwrap();
        engine.create(&comment("c2", "https://x.com/1", "u1", 1)).unwrap();

        engine.delete(&c1.locator, "c1", DeleteMode::Soft).unwrap();

        let last = engine.last(SITE, 10, None).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].id, "c2");
        assert_eq!(engine.count(&c1.locator).unwrap(), 1);

        let deleted = engine.get(&c1.locator, "c1").unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.user.id, "u1");

        // deleting again must not decrement twice
        engine.delete(&c1.locator, "c1", DeleteMode::Hard).unwrap();
        assert_eq!(engine.count(&c1.locator).unwrap(), 1);
        assert_eq!(engine.get(&c1.locator, "c1").unwrap().user.id, "deleted");
    }

    #[test]
    fn test_last_since_and_limit() {
        let (engine, _temp) = create_engine();
        for i in 0..5 {
            engine
                .create(&comment(&format!("c{}", i), "https://x.com/1", "u1", i))
                .unwrap();
        }

        let last = engine.last(SITE, 2, None).unwrap();
        let ids: Vec<_> = last.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c4", "c3"]);

        let since = Utc.timestamp_opt(1_700_000_002, 0).unwrap();
        let recent = engine.last(SITE, 0, Some(since)).unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_user_comments() {
        let (engine, _temp) = create_engine();
        for i in 0..3 {
            engine
                .create(&comment(&format!("c{}", i), "https://x.com/1", "u1", i))
                .unwrap();
        }
        engine.create(&comment("other", "https://x.com/2", "u2", 9)).unwrap();

        let (comments, total) = engine.user(SITE, "u1", 2, 0).unwrap();
        assert_eq!(total, 3);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, "c2");

        let (comments, _) = engine.user(SITE, "u1", 2, 2).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(engine.user_count(SITE, "u1").unwrap(), 3);
        assert!(matches!(
            engine.user(SITE, "nobody", 0, 0),
            Err(RemarkError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_user() {
        let (engine, _temp) = create_engine();
        engine.create(&comment("c1", "https://x.com/1", "u1", 0)).unwrap();
        engine.create(&comment("c2", "https://x.com/2", "u1", 1)).unwrap();
        engine.create(&comment("c3", "https://x.com/1", "u2", 2)).unwrap();

        engine.delete_user(SITE, "u1").unwrap();

        assert!(matches!(engine.user(SITE, "u1", 0, 0), Err(RemarkError::NotFound(_))));
        let last = engine.last(SITE, 0, None).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].id, "c3");

        let c1 = engine.get(&Locator::new(SITE, "https://x.com/1"), "c1").unwrap();
        assert_eq!(c1.user.id, "deleted");
        assert_eq!(engine.count(&Locator::new(SITE, "https://x.com/1")).unwrap(), 1);
        assert_eq!(engine.count(&Locator::new(SITE, "https://x.com/2")).unwrap(), 0);
    }

    #[test]
    fn test_delete_all_keeps_blocks() {
        let (engine, _temp) = create_engine();
        engine.create(&comment("c1", "https://x.com/1", "u1", 0)).unwrap();
        engine.set_block(SITE, "u1", true, Duration::ZERO).unwrap();

        engine.delete_all(SITE).unwrap();

        assert_eq!(engine.count(&Locator::new(SITE, "https://x.com/1")).unwrap(), 0);
        assert!(engine.last(SITE, 0, None).unwrap().is_empty());
        assert!(engine.list(SITE, 0, 0).unwrap().is_empty());
        assert!(engine.is_blocked(SITE, "u1").unwrap());
    }

    #[test]
    fn test_blocks() {
        let (engine, _temp) = create_engine();
        let mut c = comment("c1", "https://x.com/1", "u1", 0);
        c.user.name = "User One".to_string();
        engine.create(&c).unwrap();

        assert!(!engine.is_blocked(SITE, "u1").unwrap());
        engine.set_block(SITE, "u1", true, Duration::ZERO).unwrap();
        engine.set_block(SITE, "u2", true, Duration::from_secs(3600)).unwrap();
        assert!(engine.is_blocked(SITE, "u1").unwrap());
        assert!(engine.is_blocked(SITE, "u2").unwrap());

        let blocked = engine.blocked(SITE).unwrap();
        assert_eq!(blocked.len(), 2);
        assert_eq!(blocked[0].name, "User One");
        assert_eq!(blocked[1].name, "u2");

        engine.set_block(SITE, "u1", false, Duration::ZERO).unwrap();
        assert!(!engine.is_blocked(SITE, "u1").unwrap());
    }

    #[test]
    fn test_list_and_info() {
        let (engine, _temp) = create_engine();
        engine.create(&comment("c1", "https://x.com/1", "u1", 0)).unwrap();
        engine.create(&comment("c2", "https://x.com/1", "u1", 5)).unwrap();
        engine.create(&comment("c3", "https://x.com/2", "u1", 10)).unwrap();
        engine
            .set_read_only(&Locator::new(SITE, "https://x.com/1"), true)
            .unwrap();

        let posts = engine.list(SITE, 0, 0).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].url, "https://x.com/2");
        assert_eq!(posts[1].count, 2);
        assert!(posts[1].read_only);

        let page = engine.list(SITE, 1, 1).unwrap();
        assert_eq!(page[0].url, "https://x.com/1");

        let info = engine.info(&Locator::new(SITE, "https://x.com/2"), 0).unwrap();
        assert_eq!(info.count, 1);
        assert!(!info.read_only);

        // created in 2023, well past one day
        let aged = engine.info(&Locator::new(SITE, "https://x.com/2"), 1).unwrap();
        assert!(aged.read_only);

        assert!(engine.info(&Locator::new(SITE, "https://x.com/3"), 0).is_err());
    }

    #[test]
    fn test_info_ignores_tombstones() {
        let (engine, _temp) = create_engine();
        let locator = Locator::new(SITE, "https://x.com/1");
        engine.create(&comment("c1", "https://x.com/1", "u1", 0)).unwrap();
        engine.create(&comment("c2", "https://x.com/1", "u2", 5)).unwrap();

        engine.delete(&locator, "c2", DeleteMode::Soft).unwrap();
        let info = engine.info(&locator, 0).unwrap();
        assert_eq!(info.count, 1);
        assert_eq!(info.last_ts, info.first_ts);

        engine.delete(&locator, "c1", DeleteMode::Hard).unwrap();
        assert!(matches!(engine.info(&locator, 0), Err(RemarkError::NotFound(_))));
        assert!(engine.list(SITE, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_urls_include_tombstones() {
        let (engine, _temp) = create_engine();
        engine.create(&comment("c1", "https://x.com/b", "u1", 0)).unwrap();
        engine.create(&comment("c2", "https://x.com/a", "u1", 5)).unwrap();
        engine
            .delete(&Locator::new(SITE, "https://x.com/b"), "c1", DeleteMode::Soft)
            .unwrap();

        let urls = engine.urls(SITE).unwrap();
        assert_eq!(urls, vec!["https://x.com/a", "https://x.com/b"]);
        assert_eq!(engine.list(SITE, 0, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_verified() {
        let (engine, _temp) = create_engine();
        engine.set_verified(SITE, "u1", true).unwrap();
        assert!(engine.is_verified(SITE, "u1").unwrap());
        assert_eq!(engine.verified(SITE).unwrap(), vec!["u1".to_string()]);
        engine.set_verified(SITE, "u1", false).unwrap();
        assert!(!engine.is_verified(SITE, "u1").unwrap());
    }

    #[test]
    fn test_close() {
        let (engine, _temp) = create_engine();
        assert_eq!(engine.sites(), vec![SITE.to_string()]);
        engine.close().unwrap();
        assert!(engine.sites().is_empty());
        assert!(engine.last(SITE, 0, None).is_err());
    }
}

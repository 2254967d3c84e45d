//! Business rules above the storage engine.
//!
//! `DataService` stamps identity and time on new comments, renders and
//! sanitizes text, hashes client addresses, and enforces the edit window,
//! voting rules, blocks and read-only posts. Storage is delegated to an
//! `Engine`; cache invalidation is left to the caller.

use crate::config::ServiceConfig;
use crate::constants::MAX_EDIT_SUMMARY_SIZE;
use crate::engine::Engine;
use crate::error::{RemarkError, Result};
use crate::identity::hash_ip;
use crate::render::{ParagraphConverter, TextConverter};
use crate::store::{BlockedUser, Comment, DeleteMode, Edit, Locator, PostInfo, SortOrder};
use crate::validation::Validator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Edit of an existing comment by its author or an admin.
#[derive(Debug, Clone, Default)]
pub struct EditRequest {
    /// Who is editing.
    pub user_id: String,
    /// New original text.
    pub orig: String,
    pub summary: String,
    /// Admins bypass ownership and the edit window.
    pub admin: bool,
    /// Soft-delete the comment instead of editing it.
    pub delete: bool,
}

/// Data service enforcing product rules.
pub struct DataService {
    engine: Arc<dyn Engine>,
    config: ServiceConfig,
    converter: Box<dyn TextConverter>,
}

impl DataService {
    /// Creates a service rendering text with `ParagraphConverter`.
    pub fn new(engine: Arc<dyn Engine>, config: ServiceConfig) -> Self {
        Self {
            engine,
            config,
            converter: Box::new(ParagraphConverter),
        }
    }

    /// Replaces the text renderer.
    pub fn with_converter(mut self, converter: impl TextConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Creates a comment and returns it as stored.
    ///
    /// A missing id is generated, a zero timestamp is set to now, votes are
    /// reset. `user.ip_hash` may carry the raw client address, it is
    /// replaced by its HMAC before anything is stored.
    pub fn create(&self, mut comment: Comment) -> Result<Comment> {
        if comment.orig.is_empty() {
            comment.orig = std::mem::take(&mut comment.text);
        }
        self.validate_comment(&comment)?;
        Validator::validate_locator(&comment.locator)?;
        Validator::validate_comment_id(&comment.id)?;

        let site_id = comment.locator.site_id.clone();
        if self.engine.is_blocked(&site_id, &comment.user.id)? {
            return Err(RemarkError::forbidden(format!(
                "user {} is blocked",
                comment.user.id
            )));
        }
        if self.is_read_only(&comment.locator)? {
            return Err(RemarkError::forbidden(format!(
                "post {} is read-only",
                comment.locator.url
            )));
        }

        if comment.id.is_empty() {
            comment.id = Uuid::new_v4().to_string();
        }
        if comment.timestamp == DateTime::<Utc>::default() {
            comment.timestamp = Utc::now();
        }
        comment.votes.clear();
        comment.score = 0;
        comment.edit = None;
        comment.pin = false;
        comment.deleted = false;
        comment.text = self.converter.convert(&comment.orig);
        comment.sanitize();
        comment.user.ip_hash = hash_ip(&comment.user.ip_hash, &self.config.secret);
        comment.user.admin = self.is_admin(&site_id, &comment.user.id);
        comment.user.blocked = false;
        comment.user.verified = self.engine.is_verified(&site_id, &comment.user.id)?;

        let id = self.engine.create(&comment)?;
        info!(site = %site_id, url = %comment.locator.url, id = %id, user = %comment.user.id, "comment created");
        self.engine.get(&comment.locator, &id)
    }

    /// Edits or self-deletes a comment.
    ///
    /// The checks run against the stored comment inside the same write
    /// that applies the edit, so a comment is edited at most once.
    pub fn edit_comment(&self, locator: &Locator, id: &str, req: EditRequest) -> Result<Comment> {
        let stored = self.engine.update(locator, id, &mut |comment| {
            if !req.admin {
                if comment.user.id != req.user_id {
                    return Err(RemarkError::forbidden("only the author can edit a comment"));
                }
                if self.edit_expired(comment, Utc::now()) {
                    return Err(RemarkError::forbidden("too late to edit"));
                }
                if self.has_replies(locator, id)? {
                    return Err(RemarkError::forbidden(
                        "parent comment with replies can't be edited",
                    ));
                }
            }

            if req.delete {
                comment.deleted = true;
                return Ok(());
            }

            if comment.edit.is_some() {
                return Err(RemarkError::forbidden("comment already edited"));
            }
            comment.orig = req.orig.clone();
            self.validate_comment(comment)?;
            let summary_runes = req.summary.chars().count();
            if summary_runes > MAX_EDIT_SUMMARY_SIZE {
                return Err(RemarkError::validation(format!(
                    "edit summary exceeded max allowed size {} ({})",
                    MAX_EDIT_SUMMARY_SIZE, summary_runes
                )));
            }

            comment.text = self.converter.convert(&comment.orig);
            comment.sanitize();
            comment.edit = Some(Edit {
                timestamp: Utc::now(),
                summary: html_escape::encode_text(req.summary.trim()).into_owned(),
            });
            Ok(())
        })?;

        if req.delete {
            info!(locator = %locator, id = id, user = %req.user_id, "comment deleted by author");
        } else {
            info!(locator = %locator, id = id, user = %req.user_id, "comment edited");
        }
        Ok(stored)
    }

    /// Votes for a comment, `up` is an upvote.
    ///
    /// Voting twice with the same polarity is rejected; voting with the
    /// opposite polarity withdraws the earlier vote.
    pub fn vote(&self, locator: &Locator, id: &str, user_id: &str, up: bool) -> Result<Comment> {
        Validator::validate_user_id(user_id)?;
        let is_dev = self.config.dev_principal.as_deref() == Some(user_id);

        let stored = self.engine.update(locator, id, &mut |comment| {
            if comment.user.id == user_id && !is_dev {
                return Err(RemarkError::forbidden("self-voting is not allowed"));
            }

            match comment.votes.get(user_id).copied() {
                Some(prev) if prev == up => {
                    return Err(RemarkError::forbidden(format!(
                        "user {} already voted for {}",
                        user_id, id
                    )));
                }
                Some(_) => {
                    comment.votes.remove(user_id);
                }
                None => {
                    if self.config.max_votes > 0 && comment.votes.len() >= self.config.max_votes {
                        return Err(RemarkError::forbidden("maximum number of votes exceeded"));
                    }
                    if self.config.positive_score && !up && comment.score <= 0 {
                        return Err(RemarkError::forbidden("minimal score reached"));
                    }
                    comment.votes.insert(user_id.to_string(), up);
                }
            }
            comment.score = comment.votes_score();
            Ok(())
        })?;

        debug!(locator = %locator, id = id, user = user_id, up = up, score = stored.score, "vote recorded");
        Ok(stored)
    }

    /// Pins or unpins a comment.
    pub fn set_pin(&self, locator: &Locator, id: &str, status: bool) -> Result<Comment> {
        self.engine.update(locator, id, &mut |comment| {
            comment.pin = status;
            Ok(())
        })
    }

    /// Deletes a comment.
    pub fn delete(&self, locator: &Locator, id: &str, mode: DeleteMode) -> Result<()> {
        self.engine.delete(locator, id, mode)?;
        info!(locator = %locator, id = id, mode = %mode, "comment deleted");
        Ok(())
    }

    /// Erases a user's identity from all their comments.
    pub fn delete_user(&self, site_id: &str, user_id: &str) -> Result<()> {
        self.engine.delete_user(site_id, user_id)
    }

    /// Removes every comment of a site.
    pub fn delete_all(&self, site_id: &str) -> Result<()> {
        self.engine.delete_all(site_id)
    }

    /// Blocks (`ttl` zero is permanent) or unblocks a user.
    pub fn set_block(&self, site_id: &str, user_id: &str, status: bool, ttl: Duration) -> Result<()> {
        self.engine.set_block(site_id, user_id, status, ttl)
    }

    pub fn set_read_only(&self, locator: &Locator, status: bool) -> Result<()> {
        self.engine.set_read_only(locator, status)
    }

    pub fn set_verified(&self, site_id: &str, user_id: &str, status: bool) -> Result<()> {
        self.engine.set_verified(site_id, user_id, status)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, locator: &Locator, id: &str) -> Result<Comment> {
        self.engine.get(locator, id)
    }

    pub fn find(&self, locator: &Locator, sort: SortOrder) -> Result<Vec<Comment>> {
        self.engine.find(locator, sort)
    }

    pub fn last(
        &self,
        site_id: &str,
        max: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Comment>> {
        self.engine.last(site_id, max, since)
    }

    /// Comments of a user, newest first, with their total count.
    pub fn user_comments(
        &self,
        site_id: &str,
        user_id: &str,
        limit: usize,
        skip: usize,
    ) -> Result<(Vec<Comment>, usize)> {
        self.engine.user(site_id, user_id, limit, skip)
    }

    pub fn user_count(&self, site_id: &str, user_id: &str) -> Result<usize> {
        self.engine.user_count(site_id, user_id)
    }

    pub fn count(&self, locator: &Locator) -> Result<usize> {
        self.engine.count(locator)
    }

    /// Comment counts of several posts of one site.
    pub fn counts(&self, site_id: &str, urls: &[String]) -> Result<Vec<PostInfo>> {
        urls.iter()
            .map(|url| {
                let count = self.engine.count(&Locator::new(site_id, url.as_str()))?;
                Ok(PostInfo {
                    url: url.clone(),
                    count,
                    ..PostInfo::default()
                })
            })
            .collect()
    }

    pub fn list(&self, site_id: &str, limit: usize, skip: usize) -> Result<Vec<PostInfo>> {
        self.engine.list(site_id, limit, skip)
    }

    /// Summary of a post using the configured read-only age.
    pub fn info(&self, locator: &Locator) -> Result<PostInfo> {
        self.engine.info(locator, self.config.read_only_age_days)
    }

    pub fn is_blocked(&self, site_id: &str, user_id: &str) -> Result<bool> {
        self.engine.is_blocked(site_id, user_id)
    }

    pub fn blocked(&self, site_id: &str) -> Result<Vec<BlockedUser>> {
        self.engine.blocked(site_id)
    }

    pub fn is_verified(&self, site_id: &str, user_id: &str) -> Result<bool> {
        self.engine.is_verified(site_id, user_id)
    }

    /// Returns true if the post was marked read-only or is older than the
    /// configured read-only age.
    pub fn is_read_only(&self, locator: &Locator) -> Result<bool> {
        if self.engine.is_read_only(locator)? {
            return Ok(true);
        }
        if self.config.read_only_age_days == 0 {
            return Ok(false);
        }
        match self.info(locator) {
            Ok(info) => Ok(info.read_only),
            Err(RemarkError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Returns true if the comment has at least one non-deleted reply.
    pub fn has_replies(&self, locator: &Locator, id: &str) -> Result<bool> {
        let comments = self.engine.find(locator, SortOrder::Time)?;
        Ok(comments.iter().any(|c| c.parent_id == id && !c.deleted))
    }

    /// Returns true if the user is a configured admin of the site.
    pub fn is_admin(&self, site_id: &str, user_id: &str) -> bool {
        self.config
            .admins
            .get(site_id)
            .is_some_and(|ids| ids.iter().any(|id| id == user_id))
    }

    /// Checks a comment against the size and author rules.
    pub fn validate_comment(&self, comment: &Comment) -> Result<()> {
        Validator::validate_comment(comment, self.config.max_comment_size)
    }

    fn edit_expired(&self, comment: &Comment, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.config.edit_duration) {
            Ok(window) => comment
                .timestamp
                .checked_add_signed(window)
                .map_or(false, |deadline| now > deadline),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for DataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataService")
            .field("config", &self.config)
            .field("sites", &self.engine.sites())
            .finish()
    }
}

//! Per-viewer presentation of comments.
//!
//! The view is applied to comments before a response is cached, so its
//! output depends only on the blocked set, the admin flag and the default
//! avatar.

use crate::error::Result;
use crate::service::DataService;
use crate::store::{Comment, DeleteMode};
use std::collections::HashSet;

/// Flags blocked authors, fills default avatars and hides IP hashes from
/// non-admins. Only non-admins get blocked authors' text masked.
#[derive(Debug, Clone, Default)]
pub struct ModerationView {
    blocked: HashSet<String>,
    admin: bool,
    default_avatar: String,
}

impl ModerationView {
    pub fn new<I>(blocked: I, admin: bool, default_avatar: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            blocked: blocked.into_iter().collect(),
            admin,
            default_avatar: default_avatar.into(),
        }
    }

    /// Builds the view for a viewer of `site_id` from the currently active
    /// blocks.
    pub fn for_site(service: &DataService, site_id: &str, admin: bool) -> Result<Self> {
        let blocked = service.blocked(site_id)?.into_iter().map(|b| b.id);
        Ok(Self::new(
            blocked,
            admin,
            service.config().default_avatar.clone(),
        ))
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn apply_one(&self, comment: &mut Comment) {
        if self.blocked.contains(&comment.user.id) {
            if !self.admin {
                comment.set_deleted(DeleteMode::Soft);
            }
            comment.user.blocked = true;
        }
        if comment.user.picture.is_empty() && !self.default_avatar.is_empty() {
            comment.user.picture = self.default_avatar.clone();
        }
        if !self.admin {
            comment.user.ip_hash.clear();
        }
    }

    pub fn apply(&self, comments: &mut [Comment]) {
        for comment in comments.iter_mut() {
            self.apply_one(comment);
        }
    }
}

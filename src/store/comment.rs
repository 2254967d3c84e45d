//! The comment entity.

use super::types::{DeleteMode, Edit, Locator, User};
use crate::constants::{DELETED_USER, REF_SEPARATOR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single comment on a post.
///
/// JSON field names are the ones used by the HTTP API and the backup format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    /// Empty for top-level comments.
    #[serde(rename = "pid", default)]
    pub parent_id: String,
    /// Rendered, sanitized HTML.
    #[serde(default)]
    pub text: String,
    /// Text as supplied by the author.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub orig: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub locator: Locator,
    #[serde(default)]
    pub score: i64,
    /// Voter id to polarity, true is an upvote.
    #[serde(default)]
    pub votes: BTreeMap<String, bool>,
    #[serde(rename = "time", default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<Edit>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pin: bool,
    #[serde(rename = "delete", default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Comment {
    /// Creates a top-level comment with the author's text.
    pub fn new(locator: Locator, user: User, orig: impl Into<String>) -> Self {
        Self {
            locator,
            user,
            orig: orig.into(),
            ..Self::default()
        }
    }

    /// Makes this comment a reply to `parent_id`.
    pub fn reply_to(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    /// Returns the `url!!id` reference stored by the secondary indexes.
    pub fn reference(&self) -> String {
        format!("{}{}{}", self.locator.url, REF_SEPARATOR, self.id)
    }

    /// Clears content in place, leaving a tombstone that keeps the thread
    /// structure (`parent_id`, `timestamp`, `locator`) intact.
    pub fn set_deleted(&mut self, mode: DeleteMode) {
        self.text.clear();
        self.orig.clear();
        self.edit = None;
        self.score = 0;
        self.votes.clear();
        self.pin = false;
        self.deleted = true;

        if mode == DeleteMode::Hard {
            self.user.id = DELETED_USER.to_string();
            self.user.name = DELETED_USER.to_string();
            self.user.picture.clear();
            self.user.ip_hash.clear();
        }
    }

    /// Escapes user-supplied strings that end up in HTML attributes.
    /// Already escaped values are left as they are.
    pub fn sanitize(&mut self) {
        fn text(value: &str) -> String {
            html_escape::encode_text(&html_escape::decode_html_entities(value)).into_owned()
        }
        self.user.id = text(&self.user.id);
        self.user.name = text(self.user.name.trim());
        self.user.picture = html_escape::encode_double_quoted_attribute(
            &html_escape::decode_html_entities(&self.user.picture),
        )
        .into_owned();
        if self.user.name.is_empty() {
            self.user.name = self.user.id.clone();
        }
    }

    /// Drops everything a client may not choose when posting: id, time,
    /// votes, score, edit, pin and deletion. The service fills them in.
    pub fn prepare_untrusted(&mut self) {
        self.id.clear();
        self.timestamp = DateTime::<Utc>::default();
        self.votes.clear();
        self.score = 0;
        self.edit = None;
        self.pin = false;
        self.deleted = false;
    }

    /// Score derived from the vote map.
    pub fn votes_score(&self) -> i64 {
        self.votes.values().map(|up| if *up { 1 } else { -1 }).sum()
    }

    /// Number of up and down votes.
    pub fn ups_downs(&self) -> (usize, usize) {
        let ups = self.votes.values().filter(|up| **up).count();
        (ups, self.votes.len() - ups)
    }

    /// Controversy grows with the number of votes and their balance. A
    /// comment without both up and down votes has none.
    pub fn controversy(&self) -> f64 {
        let (ups, downs) = self.ups_downs();
        if ups == 0 || downs == 0 {
            return 0.0;
        }
        let magnitude = (ups + downs) as f64;
        let balance = if ups > downs {
            downs as f64 / ups as f64
        } else {
            ups as f64 / downs as f64
        };
        magnitude.powf(balance)
    }
}

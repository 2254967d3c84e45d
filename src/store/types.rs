//! Supporting types of the comment model.
//!
//! - `Locator`: the `(site, url)` pair identifying a post
//! - `User`: the author snapshot embedded into every comment
//! - `Edit`, `BlockedUser`, `PostInfo`: small records
//! - `SortOrder`, `DeleteMode`: request options

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a post, `site` partitions every index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locator {
    #[serde(rename = "site", default)]
    pub site_id: String,
    #[serde(default)]
    pub url: String,
}

impl Locator {
    /// Creates a locator for a post on a site.
    pub fn new(site_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site_id, self.url)
    }
}

/// Author snapshot stored with each comment.
///
/// `ip_hash` holds the client address only until the data service replaces
/// it with its HMAC; a raw address is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub picture: String,
    #[serde(rename = "ip", default, skip_serializing_if = "String::is_empty")]
    pub ip_hash: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(rename = "block", default, skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub verified: bool,
}

impl User {
    /// Creates a user with an id and a display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Set on a comment by a successful edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
}

/// Member of a site's block list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedUser {
    pub id: String,
    pub name: String,
    /// Block expiry.
    #[serde(rename = "time")]
    pub until: DateTime<Utc>,
}

/// Summary of one post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInfo {
    pub url: String,
    pub count: usize,
    #[serde(rename = "read_only", default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    #[serde(rename = "first_time", default, skip_serializing_if = "Option::is_none")]
    pub first_ts: Option<DateTime<Utc>>,
    #[serde(rename = "last_time", default, skip_serializing_if = "Option::is_none")]
    pub last_ts: Option<DateTime<Utc>>,
}

// =============================================================================
// Request Options
// =============================================================================

/// Ordering of a post's comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending creation time.
    #[default]
    Time,
    TimeDesc,
    /// Ascending latest activity in the comment's subtree.
    Active,
    ActiveDesc,
    /// Ascending score, ties by ascending time.
    Score,
    ScoreDesc,
    /// Ascending controversy, ties by ascending time.
    Controversy,
    ControversyDesc,
}

impl FromStr for SortOrder {
    type Err = std::convert::Infallible;

    /// Unknown values fall back to ascending time.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let order = match s.trim() {
            "-time" => SortOrder::TimeDesc,
            "active" | "+active" => SortOrder::Active,
            "-active" => SortOrder::ActiveDesc,
            "score" | "+score" => SortOrder::Score,
            "-score" => SortOrder::ScoreDesc,
            "controversy" | "+controversy" => SortOrder::Controversy,
            "-controversy" => SortOrder::ControversyDesc,
            _ => SortOrder::Time,
        };
        Ok(order)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortOrder::Time => "time",
            SortOrder::TimeDesc => "-time",
            SortOrder::Active => "active",
            SortOrder::ActiveDesc => "-active",
            SortOrder::Score => "score",
            SortOrder::ScoreDesc => "-score",
            SortOrder::Controversy => "controversy",
            SortOrder::ControversyDesc => "-controversy",
        };
        write!(f, "{}", s)
    }
}

impl SortOrder {
    /// Parses an optional query value.
    pub fn parse(s: Option<&str>) -> Self {
        s.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

/// How much of a comment a delete erases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Clear content, keep a tombstone with the author.
    Soft,
    /// Clear content and the author's identity.
    Hard,
}

impl fmt::Display for DeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteMode::Soft => write!(f, "soft"),
            DeleteMode::Hard => write!(f, "hard"),
        }
    }
}

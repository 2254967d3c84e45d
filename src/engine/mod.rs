//! Storage engine for comments.
//!
//! The `Engine` trait is the seam between business rules and persistence.
//! Every operation runs inside exactly one transaction of one site: reads
//! see a consistent snapshot, writes update all buckets atomically.
//!
//! ## Modules
//!
//! - `keys`: bucket names, key and reference codecs
//! - `rocks`: RocksDB implementation, one database per site

pub mod keys;
mod rocks;

pub use rocks::RocksEngine;

use crate::error::Result;
use crate::store::{BlockedUser, Comment, DeleteMode, Locator, PostInfo, SortOrder};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::time::Duration;

/// Persistence of comments and their indexes.
pub trait Engine: Send + Sync {
    /// Stores a new comment and updates every index. Returns its id.
    ///
    /// Fails with `Duplicate` if the id already exists on the site and with
    /// `Validation` if the parent is not a comment of the same post.
    fn create(&self, comment: &Comment) -> Result<String>;

    /// Loads a single comment.
    fn get(&self, locator: &Locator, id: &str) -> Result<Comment>;

    /// Changes a stored comment in one write transaction and returns the
    /// result.
    ///
    /// `change` sees the comment as currently stored and nothing is written
    /// if it fails. `id`, `locator`, `parent_id`, `timestamp` and `user`
    /// keep their stored values. Setting `deleted` soft-deletes the comment
    /// with its index updates. A deleted comment can't be changed.
    fn update(
        &self,
        locator: &Locator,
        id: &str,
        change: &mut dyn FnMut(&mut Comment) -> Result<()>,
    ) -> Result<Comment>;

    /// All comments of a post, deleted ones included, in the given order.
    fn find(&self, locator: &Locator, sort: SortOrder) -> Result<Vec<Comment>>;

    /// Newest non-deleted comments of a site, optionally only those created
    /// after `since`. `max` of 0 or above the cap means the cap.
    fn last(&self, site_id: &str, max: usize, since: Option<DateTime<Utc>>)
        -> Result<Vec<Comment>>;

    /// Non-deleted comments of a user, newest first, with their total count.
    fn user(
        &self,
        site_id: &str,
        user_id: &str,
        limit: usize,
        skip: usize,
    ) -> Result<(Vec<Comment>, usize)>;

    /// Number of non-deleted comments of a user.
    fn user_count(&self, site_id: &str, user_id: &str) -> Result<usize>;

    /// Number of non-deleted comments of a post, 0 for an unknown post.
    fn count(&self, locator: &Locator) -> Result<usize>;

    /// Posts with comments, most recently commented first.
    fn list(&self, site_id: &str, limit: usize, skip: usize) -> Result<Vec<PostInfo>>;

    /// Urls of every post holding comments, tombstones included, ascending.
    fn urls(&self, site_id: &str) -> Result<Vec<String>>;

    /// Summary of one post. Posts older than `read_only_age_days` (if not 0)
    /// are reported read-only.
    fn info(&self, locator: &Locator, read_only_age_days: u32) -> Result<PostInfo>;

    /// Blocks a user for `ttl` (zero is permanent) or lifts the block.
    fn set_block(&self, site_id: &str, user_id: &str, status: bool, ttl: Duration) -> Result<()>;

    /// Returns true if the user is currently blocked.
    fn is_blocked(&self, site_id: &str, user_id: &str) -> Result<bool>;

    /// Currently blocked users.
    fn blocked(&self, site_id: &str) -> Result<Vec<BlockedUser>>;

    /// Marks a post read-only or writable.
    fn set_read_only(&self, locator: &Locator, status: bool) -> Result<()>;

    /// Returns true if the post was marked read-only.
    fn is_read_only(&self, locator: &Locator) -> Result<bool>;

    /// Marks a user verified or not.
    fn set_verified(&self, site_id: &str, user_id: &str, status: bool) -> Result<()>;

    /// Returns true if the user is verified.
    fn is_verified(&self, site_id: &str, user_id: &str) -> Result<bool>;

    /// Ids of verified users.
    fn verified(&self, site_id: &str) -> Result<Vec<String>>;

    /// Deletes a comment, leaving a tombstone in its post.
    fn delete(&self, locator: &Locator, id: &str, mode: DeleteMode) -> Result<()>;

    /// Removes all comments of a site. Blocks and flags survive.
    fn delete_all(&self, site_id: &str) -> Result<()>;

    /// Erases a user's identity from all their comments and drops their
    /// activity index.
    fn delete_user(&self, site_id: &str, user_id: &str) -> Result<()>;

    /// Sites served by this engine.
    fn sites(&self) -> Vec<String>;

    /// Flushes and releases all sites.
    fn close(&self) -> Result<()>;
}

/// Sorts a flat list of comments.
///
/// There is no subtree in a flat list, so activity ordering falls back to
/// creation time. Score and controversy ties keep ascending time even when
/// the order is descending.
pub fn sort_comments(comments: &mut [Comment], sort: SortOrder) {
    let by_time = |a: &Comment, b: &Comment| a.timestamp.cmp(&b.timestamp);
    match sort {
        SortOrder::Time | SortOrder::Active => comments.sort_by(by_time),
        SortOrder::TimeDesc | SortOrder::ActiveDesc => comments.sort_by(|a, b| by_time(b, a)),
        SortOrder::Score => {
            comments.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| by_time(a, b)))
        }
        SortOrder::ScoreDesc => {
            comments.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| by_time(a, b)))
        }
        SortOrder::Controversy => comments.sort_by(|a, b| {
            cmp_f64(a.controversy(), b.controversy()).then_with(|| by_time(a, b))
        }),
        SortOrder::ControversyDesc => comments.sort_by(|a, b| {
            cmp_f64(b.controversy(), a.controversy()).then_with(|| by_time(a, b))
        }),
    }
}

pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::User;
    use chrono::TimeZone;

    fn comment(id: &str, secs: i64, score: i64) -> Comment {
        let mut c = Comment::new(Locator::new("s", "u"), User::new("u1", "n"), "t");
        c.id = id.to_string();
        c.timestamp = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        c.score = score;
        c
    }

    fn ids(comments: &[Comment]) -> Vec<&str> {
        comments.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_sort_by_time() {
        let mut comments = vec![comment("b", 2, 0), comment("a", 1, 0), comment("c", 3, 0)];
        sort_comments(&mut comments, SortOrder::Time);
        assert_eq!(ids(&comments), vec!["a", "b", "c"]);
        sort_comments(&mut comments, SortOrder::TimeDesc);
        assert_eq!(ids(&comments), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_by_score_keeps_time_tiebreak() {
        let mut comments = vec![
            comment("late", 3, 5),
            comment("early", 1, 5),
            comment("low", 2, -1),
        ];
        sort_comments(&mut comments, SortOrder::Score);
        assert_eq!(ids(&comments), vec!["low", "early", "late"]);
        sort_comments(&mut comments, SortOrder::ScoreDesc);
        assert_eq!(ids(&comments), vec!["early", "late", "low"]);
    }
}

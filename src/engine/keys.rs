//! Bucket names and key/value codecs of the on-disk layout.
//!
//! ## Storage Layout
//!
//! One database per site, one column family per bucket:
//! - `posts`: `{url}\0{id}` -> JSON comment
//! - `last`: `{ts}` -> `{url}!!{id}`
//! - `users`: `{user_id}\0{ts}` -> `{url}!!{id}`
//! - `blocks`: `{user_id}` -> RFC 3339 block expiry
//! - `counts`: `{url}` -> decimal count of non-deleted comments
//! - `readonly`: `{url}` -> `1`
//! - `verified`: `{user_id}` -> RFC 3339 verification time
//! - `ids`: `{id}` -> `{url}`, keeps comment ids unique across the site
//!
//! `{ts}` is the comment creation time in a fixed-width form that sorts
//! lexicographically in time order.

use crate::constants::{NESTED_SEPARATOR, REF_SEPARATOR, TS_KEY_FORMAT};
use crate::error::{RemarkError, Result};
use crate::storage::prefixed_key;
use chrono::{DateTime, Utc};

pub const CF_POSTS: &str = "posts";
pub const CF_LAST: &str = "last";
pub const CF_USERS: &str = "users";
pub const CF_BLOCKS: &str = "blocks";
pub const CF_COUNTS: &str = "counts";
pub const CF_READONLY: &str = "readonly";
pub const CF_VERIFIED: &str = "verified";
pub const CF_IDS: &str = "ids";

/// Every bucket of a site database.
pub const ALL_BUCKETS: &[&str] = &[
    CF_POSTS,
    CF_LAST,
    CF_USERS,
    CF_BLOCKS,
    CF_COUNTS,
    CF_READONLY,
    CF_VERIFIED,
    CF_IDS,
];

/// Buckets dropped by a site wipe.
pub const WIPED_BUCKETS: &[&str] = &[CF_POSTS, CF_LAST, CF_USERS, CF_COUNTS, CF_IDS];

/// Formats a timestamp as a sortable key.
pub fn ts_key(ts: &DateTime<Utc>) -> String {
    ts.format(TS_KEY_FORMAT).to_string()
}

/// Prefix of all comments of a post.
pub fn post_prefix(url: &str) -> Vec<u8> {
    let mut prefix = url.as_bytes().to_vec();
    prefix.push(NESTED_SEPARATOR);
    prefix
}

/// Key of a comment inside its post.
pub fn post_key(url: &str, id: &str) -> Vec<u8> {
    prefixed_key(url.as_bytes(), NESTED_SEPARATOR, id.as_bytes())
}

/// Prefix of all activity entries of a user.
pub fn user_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = user_id.as_bytes().to_vec();
    prefix.push(NESTED_SEPARATOR);
    prefix
}

/// Key of one activity entry of a user.
pub fn user_key(user_id: &str, ts: &str) -> Vec<u8> {
    prefixed_key(user_id.as_bytes(), NESTED_SEPARATOR, ts.as_bytes())
}

/// Splits a nested key into its parent and child parts.
pub fn split_nested(key: &[u8]) -> Result<(&str, &str)> {
    let pos = key
        .iter()
        .position(|b| *b == NESTED_SEPARATOR)
        .ok_or_else(|| RemarkError::corruption("nested key without separator"))?;
    let parent = std::str::from_utf8(&key[..pos])
        .map_err(|_| RemarkError::corruption("nested key is not valid UTF-8"))?;
    let child = std::str::from_utf8(&key[pos + 1..])
        .map_err(|_| RemarkError::corruption("nested key is not valid UTF-8"))?;
    Ok((parent, child))
}

/// Builds a `url!!id` reference.
pub fn make_ref(url: &str, id: &str) -> String {
    format!("{}{}{}", url, REF_SEPARATOR, id)
}

/// Parses a `url!!id` reference, splitting on the first separator.
///
/// A malformed reference means the indexes are damaged.
pub fn parse_ref(value: &[u8]) -> Result<(String, String)> {
    let s = std::str::from_utf8(value)
        .map_err(|_| RemarkError::corruption("reference is not valid UTF-8"))?;
    match s.split_once(REF_SEPARATOR) {
        Some((url, id)) if !url.is_empty() && !id.is_empty() => {
            Ok((url.to_string(), id.to_string()))
        }
        _ => Err(RemarkError::corruption(format!("invalid reference {:?}", s))),
    }
}

/// Parses a stored post count.
pub fn parse_count(value: &[u8]) -> Result<usize> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RemarkError::corruption("invalid post count"))
}

/// Parses a stored RFC 3339 timestamp.
pub fn parse_time(value: &[u8]) -> Result<DateTime<Utc>> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| RemarkError::corruption("invalid stored timestamp"))
}

/// Formats a timestamp for storage as a value.
pub fn format_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_ts_key_sorts() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let t2 = t1 + Duration::nanoseconds(1);
        let t3 = t1 + Duration::seconds(10);

        assert_eq!(ts_key(&t1), "2024-01-02T03:04:05.000000000Z");
        assert_eq!(ts_key(&t2), "2024-01-02T03:04:05.000000001Z");
        assert!(ts_key(&t1) < ts_key(&t2));
        assert!(ts_key(&t2) < ts_key(&t3));
        assert_eq!(ts_key(&t1).len(), ts_key(&t3).len());
    }

    #[test]
    fn test_parse_ref() {
        let (url, id) = parse_ref(b"https://radio-t.com/blah!!c1").unwrap();
        assert_eq!(url, "https://radio-t.com/blah");
        assert_eq!(id, "c1");

        // split on the first separator only
        let (url, id) = parse_ref(b"https://x.com/a!!b!!c").unwrap();
        assert_eq!(url, "https://x.com/a");
        assert_eq!(id, "b!!c");
    }

    #[test]
    fn test_parse_ref_malformed() {
        for bad in [&b"no-separator"[..], b"!!id", b"url!!", b"\xff\xfe!!x"] {
            let err = parse_ref(bad).unwrap_err();
            assert!(matches!(err, RemarkError::Corruption(_)));
        }
    }

    #[test]
    fn test_nested_keys() {
        let key = post_key("https://x.com/1", "abc");
        assert!(key.starts_with(&post_prefix("https://x.com/1")));
        assert!(!key.starts_with(&post_prefix("https://x.com/")));
        assert_eq!(split_nested(&key).unwrap(), ("https://x.com/1", "abc"));
        assert!(split_nested(b"flat").is_err());
    }

    #[test]
    fn test_counts_and_times() {
        assert_eq!(parse_count(b"42").unwrap(), 42);
        assert!(parse_count(b"-1").is_err());

        let t = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(parse_time(format_time(&t).as_bytes()).unwrap(), t);
        assert!(parse_time(b"yesterday").is_err());
    }
}

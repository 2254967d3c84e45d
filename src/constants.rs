//! Shared constants for limits and on-disk formats.
//!
//! These constants are used by both the library and the HTTP server to keep
//! request clamping consistent.

// =============================================================================
// Query Limits
// =============================================================================

/// Maximum number of comments returned by a "last comments" query.
pub const LAST_LIMIT: usize = 1000;

/// Maximum number of comments returned by a "comments by user" query.
pub const USER_LIMIT: usize = 50;

/// Default number of posts in a post listing page.
pub const LIST_LIMIT: usize = 100;

// =============================================================================
// Content Limits
// =============================================================================

/// Default maximum comment size in runes.
pub const DEFAULT_MAX_COMMENT_SIZE: usize = 2000;

/// Maximum length of an edit summary in runes.
pub const MAX_EDIT_SUMMARY_SIZE: usize = 200;

/// Default edit window in seconds (5 minutes).
pub const DEFAULT_EDIT_DURATION_SECS: u64 = 5 * 60;

// =============================================================================
// Storage Formats
// =============================================================================

/// Separator between the URL and the comment id in a reference string.
pub const REF_SEPARATOR: &str = "!!";

/// Separator between a parent bucket and its child key.
pub const NESTED_SEPARATOR: u8 = 0x00;

/// Timestamp format for `last` and `users` keys, fixed width and
/// lexicographically sortable.
pub const TS_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// User name and id written into hard-deleted comments.
pub const DELETED_USER: &str = "deleted";

//! Comment data model.
//!
//! A post is identified by a `Locator`; every comment embeds the `User`
//! snapshot of its author taken at creation time. Comments form a forest
//! through `parent_id` and are never physically unlinked: deletion leaves a
//! tombstone so replies keep their place.

mod comment;
mod types;

pub use comment::Comment;
pub use types::{BlockedUser, DeleteMode, Edit, Locator, PostInfo, SortOrder, User};

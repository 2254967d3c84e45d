//! Input validation for comments, locators and identifiers.
//!
//! Every check here runs before a write transaction is opened, so rejected
//! input never touches a bucket.

use crate::error::{RemarkError, Result};
use crate::store::{Comment, Locator, User};
use chrono::{DateTime, Datelike, Utc};

/// Maximum allowed site id length
pub const MAX_SITE_ID_LENGTH: usize = 256;

/// Maximum allowed post URL length (4KB)
pub const MAX_URL_LENGTH: usize = 4 * 1024;

/// Maximum allowed user id length
pub const MAX_USER_ID_LENGTH: usize = 1024;

/// Maximum allowed user name length in runes
pub const MAX_USER_NAME_LENGTH: usize = 256;

/// Maximum allowed comment id length
pub const MAX_COMMENT_ID_LENGTH: usize = 256;

/// Latest year a comment timestamp may carry, index keys use four digits
pub const MAX_TIMESTAMP_YEAR: i32 = 9999;

/// Validation functions for comment input
pub struct Validator;

impl Validator {
    /// Validate a site id.
    ///
    /// Site ids name a database directory, so only `[A-Za-z0-9._-]` is
    /// accepted and the path components `.` and `..` are refused.
    pub fn validate_site_id(site_id: &str) -> Result<()> {
        if site_id.is_empty() {
            return Err(RemarkError::validation("site id cannot be empty"));
        }
        if site_id.len() > MAX_SITE_ID_LENGTH {
            return Err(RemarkError::validation(format!(
                "site id too long: {} bytes exceeds maximum of {} bytes",
                site_id.len(),
                MAX_SITE_ID_LENGTH
            )));
        }
        if site_id == "." || site_id == ".." {
            return Err(RemarkError::validation("invalid site id"));
        }
        if !site_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
        {
            return Err(RemarkError::validation(format!(
                "site id {:?} contains invalid characters",
                site_id
            )));
        }
        Ok(())
    }

    /// Validate a post locator.
    pub fn validate_locator(locator: &Locator) -> Result<()> {
        Self::validate_site_id(&locator.site_id)?;
        Self::validate_key_part(&locator.url, "url", MAX_URL_LENGTH)?;
        // References split on the first separator
        if locator.url.contains(crate::constants::REF_SEPARATOR) {
            return Err(RemarkError::validation("url contains \"!!\""));
        }
        Ok(())
    }

    /// Validate a value that becomes part of a storage key.
    pub fn validate_key_part(value: &str, what: &str, max_len: usize) -> Result<()> {
        if value.is_empty() {
            return Err(RemarkError::validation(format!("{} cannot be empty", what)));
        }
        if value.len() > max_len {
            return Err(RemarkError::validation(format!(
                "{} too long: {} bytes exceeds maximum of {} bytes",
                what,
                value.len(),
                max_len
            )));
        }
        // Null bytes separate nested bucket keys
        if value.contains('\0') {
            return Err(RemarkError::validation(format!(
                "{} contains null bytes",
                what
            )));
        }
        Ok(())
    }

    /// Validate a user id.
    pub fn validate_user_id(user_id: &str) -> Result<()> {
        Self::validate_key_part(user_id, "user id", MAX_USER_ID_LENGTH)?;
        if user_id.trim().is_empty() {
            return Err(RemarkError::validation("user id cannot be empty"));
        }
        Ok(())
    }

    /// Validate the author snapshot of a comment.
    pub fn validate_user(user: &User) -> Result<()> {
        Self::validate_user_id(&user.id)?;
        if user.name.trim().is_empty() {
            return Err(RemarkError::validation("user name cannot be empty"));
        }
        let runes = user.name.chars().count();
        if runes > MAX_USER_NAME_LENGTH {
            return Err(RemarkError::validation(format!(
                "user name too long: {} runes exceeds maximum of {}",
                runes, MAX_USER_NAME_LENGTH
            )));
        }
        Ok(())
    }

    /// Validate a comment before it is stored.
    ///
    /// Checks the original text is present and at most `max_size` runes long
    /// and that the author has an id and a name.
    pub fn validate_comment(comment: &Comment, max_size: usize) -> Result<()> {
        if comment.orig.trim().is_empty() {
            return Err(RemarkError::validation("comment text cannot be empty"));
        }
        let runes = comment.orig.chars().count();
        if runes > max_size {
            return Err(RemarkError::validation(format!(
                "comment text exceeded max allowed size {} ({})",
                max_size, runes
            )));
        }
        Self::validate_user(&comment.user)
    }

    /// Validate a comment timestamp.
    pub fn validate_timestamp(ts: &DateTime<Utc>) -> Result<()> {
        if !(0..=MAX_TIMESTAMP_YEAR).contains(&ts.year()) {
            return Err(RemarkError::validation(format!(
                "timestamp {} out of range",
                ts
            )));
        }
        Ok(())
    }

    /// Validate a comment id, empty ids are allowed and generated later.
    pub fn validate_comment_id(id: &str) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        Self::validate_key_part(id, "comment id", MAX_COMMENT_ID_LENGTH)?;
        if id.contains(crate::constants::REF_SEPARATOR) {
            return Err(RemarkError::validation("comment id contains \"!!\""));
        }
        Ok(())
    }
}

//! Composite cache keys.
//!
//! A key renders as `partition@@id@@scope1$$scope2`. The partition is
//! normally the site, the id identifies the request, and the scopes decide
//! which flushes evict the entry.

use crate::error::{RemarkError, Result};
use std::fmt;

const PART_SEPARATOR: &str = "@@";
const SCOPE_SEPARATOR: &str = "$$";
const ADMIN_PREFIX: &str = "admin!!";

/// Cache key with invalidation scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Key {
    partition: String,
    id: String,
    scopes: Vec<String>,
}

impl Key {
    /// Starts a key in `partition`.
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            ..Self::default()
        }
    }

    /// Sets the request id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the invalidation scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Separates the admin view of a request from the public one.
    pub fn admin(mut self, is_admin: bool) -> Self {
        if is_admin && !self.id.starts_with(ADMIN_PREFIX) {
            self.id = format!("{}{}", ADMIN_PREFIX, self.id);
        }
        self
    }

    pub fn partition_name(&self) -> &str {
        &self.partition
    }

    pub fn id_name(&self) -> &str {
        &self.id
    }

    pub fn scope_list(&self) -> &[String] {
        &self.scopes
    }

    /// Returns true if any of this key's scopes is in `scopes`.
    pub fn in_scopes(&self, scopes: &[String]) -> bool {
        self.scopes.iter().any(|s| scopes.contains(s))
    }

    /// Returns true if the key renders unambiguously.
    pub fn is_valid(&self) -> bool {
        !self.partition.contains(PART_SEPARATOR)
            && !self.id.contains(PART_SEPARATOR)
            && self
                .scopes
                .iter()
                .all(|s| !s.is_empty() && !s.contains(SCOPE_SEPARATOR) && !s.contains(PART_SEPARATOR))
    }

    /// Parses a rendered key.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(PART_SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(RemarkError::validation(format!(
                "can't parse cache key {:?}, expected 3 parts",
                s
            )));
        }
        let scopes = if parts[2].is_empty() {
            Vec::new()
        } else {
            parts[2].split(SCOPE_SEPARATOR).map(str::to_string).collect()
        };
        Ok(Self {
            partition: parts[0].to_string(),
            id: parts[1].to_string(),
            scopes,
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.partition,
            PART_SEPARATOR,
            self.id,
            PART_SEPARATOR,
            self.scopes.join(SCOPE_SEPARATOR)
        )
    }
}

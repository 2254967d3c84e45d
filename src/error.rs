//! Error types for the comment core.

use thiserror::Error;

/// Result type alias for comment core operations.
pub type Result<T> = std::result::Result<T, RemarkError>;

/// Main error type for comment core operations.
///
/// Variants follow who is at fault: the first four are caller errors and are
/// reported back verbatim, the rest indicate a defect, corruption or an
/// infrastructure failure.
#[derive(Error, Debug)]
pub enum RemarkError {
    /// Site, post, comment or user is missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Create of an already existing `(site, id)`
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Input validation errors (empty text, oversize, malformed locator)
    #[error("validation error: {0}")]
    Validation(String),

    /// Product rule rejected the request (self-vote, edit window, blocked user)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed reference or missing bucket, needs operator attention
    #[error("store corruption: {0}")]
    Corruption(String),

    /// Storage engine failures (transaction or filesystem)
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

impl RemarkError {
    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new duplicate error.
    pub fn duplicate<T: ToString>(msg: T) -> Self {
        Self::Duplicate(msg.to_string())
    }

    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new forbidden error.
    pub fn forbidden<T: ToString>(msg: T) -> Self {
        Self::Forbidden(msg.to_string())
    }

    /// Creates a new corruption error.
    pub fn corruption<T: ToString>(msg: T) -> Self {
        Self::Corruption(msg.to_string())
    }

    /// Creates a new storage error.
    pub fn storage<T: ToString>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Returns true if the error was caused by the caller's input.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Duplicate(_) | Self::Validation(_) | Self::Forbidden(_)
        )
    }

    /// Returns true if an idempotent read may be retried after this error.
    ///
    /// Writes must not be retried blindly, they may have committed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}

impl From<serde_json::Error> for RemarkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<rocksdb::Error> for RemarkError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

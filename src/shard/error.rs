//! Error types for the shard module
//!
//! Defines errors raised while parsing and validating shard identifiers.

use thiserror::Error;

/// Errors that can occur while handling shard identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    /// The identifier is empty
    #[error("Empty shard identifier")]
    Empty,

    /// The identifier is not of the form `i` or `i-level`
    #[error("Malformed shard identifier: {0}")]
    Malformed(String),

    /// A replica identifier named level 0, which is reserved for primaries
    #[error("Replica level must be at least 1: {0}")]
    ZeroLevel(String),
}

/// Result type for shard operations
pub type ShardResult<T> = std::result::Result<T, ShardError>;

impl ShardError {
    /// Create a new malformed identifier error
    pub fn malformed(id: impl Into<String>) -> Self {
        Self::Malformed(id.into())
    }

    /// Check if this is a malformed identifier error
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

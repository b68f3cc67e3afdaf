//! Error handling for shardvault
//!
//! This module provides error types and result aliases for shard operations.

use std::io;
use thiserror::Error;

use crate::reconcile::ReconcileReport;
use crate::shard::{ShardError, ShardId};

/// Errors that can occur in shardvault operations
#[derive(Error, Debug)]
pub enum Error {
    /// `build` was called on a directory that already has shards
    #[error("Cannot build shard setup: sharding already exists ({shards} shards)")]
    AlreadyPartitioned {
        shards: usize,
    },

    /// The operation needs an existing layout but the directory is empty
    #[error("No shards exist yet; build the shard setup first")]
    NotPartitioned,

    /// A shard count of zero was requested
    #[error("Invalid shard count: {0}")]
    InvalidShardCount(usize),

    /// A query named an identifier absent from the directory
    #[error("Invalid shard ID {id:?}. Valid shard IDs: {valid:?}")]
    InvalidIdentifier {
        id: String,
        valid: Vec<String>,
    },

    /// `remove_replication` was called with no replication level present
    #[error("Cannot remove replication: no replication level present")]
    NoReplication,

    /// A shard lost its primary and every replica
    #[error("Critical integrity error: all replications and primary lost for shards {shards:?}")]
    IntegrityLoss {
        shards: Vec<ShardId>,
        report: ReconcileReport,
    },

    /// Errors raised by the directory or content store
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    /// Errors related to serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted state that cannot be interpreted
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors acquiring the writer lock
    #[error("Lock error: {0}")]
    Lock(String),

    /// Errors related to shard identifiers
    #[error("Shard error: {0}")]
    Shard(#[from] ShardError),
}

/// Result type for shardvault operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption(message.into())
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new lock error
    pub fn lock(message: impl Into<String>) -> Self {
        Self::Lock(message.into())
    }

    /// Create a new invalid identifier error
    pub fn invalid_identifier(id: impl Into<String>, valid: Vec<String>) -> Self {
        Self::InvalidIdentifier {
            id: id.into(),
            valid,
        }
    }

    /// Check if this is a storage failure
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Check if this is an integrity loss
    pub fn is_integrity_loss(&self) -> bool {
        matches!(self, Self::IntegrityLoss { .. })
    }

    /// Check if this is a corruption error
    pub fn is_corruption_error(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }

    /// Shards reported as permanently lost, if any
    pub fn lost_shards(&self) -> &[ShardId] {
        match self {
            Self::IntegrityLoss { shards, .. } => shards,
            _ => &[],
        }
    }

    /// Whether the caller can fix the condition by choosing another operation
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyPartitioned { .. }
                | Self::NotPartitioned
                | Self::InvalidShardCount(_)
                | Self::InvalidIdentifier { .. }
                | Self::NoReplication
        )
    }

    /// Get a user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::AlreadyPartitioned { .. } => {
                Some("Use add-shard or remove-shard to change the shard count".to_string())
            }
            Self::NotPartitioned => Some("Run build with an input dataset first".to_string()),
            Self::InvalidShardCount(_) => Some("The shard count must be at least 1".to_string()),
            Self::NoReplication => Some("There is nothing left to remove".to_string()),
            Self::IntegrityLoss { .. } => {
                Some("Data for the listed shards is gone. Consider restoring from a backup".to_string())
            }
            Self::Storage(err) if err.kind() == io::ErrorKind::NotFound => {
                Some("The specified file or directory does not exist".to_string())
            }
            Self::Storage(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                Some("You don't have permission to access this file or directory".to_string())
            }
            Self::Lock(_) => Some("Another process may be modifying the same store".to_string()),
            _ => None,
        }
    }
}

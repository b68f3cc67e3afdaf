//! Shard range and statistics data structures
//!
//! Provides the byte-range record stored in the directory for every shard
//! and replica, and a summary of the current layout.

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` of a shard within the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShardRange {
    /// First byte offset covered by the shard
    pub start: u64,
    /// One past the last byte offset covered by the shard
    pub end: u64,
}

impl ShardRange {
    /// Create a new range
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered by the range
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Check if the range covers no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if an offset falls inside the range
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Statistics about the current shard layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardStats {
    /// Number of primary shards
    pub shard_count: usize,
    /// Uniform replication level
    pub replication_level: u32,
    /// Number of replica entries
    pub replica_count: usize,
    /// Length of the logical dataset in bytes
    pub dataset_len: u64,
    /// Size of the smallest primary shard in bytes
    pub smallest_shard: u64,
    /// Size of the largest primary shard in bytes
    pub largest_shard: u64,
}

impl ShardStats {
    /// Create new empty shard stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there are any shards
    pub fn has_shards(&self) -> bool {
        self.shard_count > 0
    }

    /// Calculate the average shard size in bytes
    pub fn avg_shard_size(&self) -> f64 {
        if self.shard_count == 0 {
            return 0.0;
        }

        self.dataset_len as f64 / self.shard_count as f64
    }

    /// Total bytes held by primaries and replicas together
    pub fn stored_bytes(&self) -> u64 {
        self.dataset_len * (1 + self.replication_level as u64)
    }

    /// Create a human-readable report of statistics
    pub fn report(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Shard Statistics ===\n\n");

        result.push_str(&format!("Total Shards: {}\n", self.shard_count));
        result.push_str(&format!("Replication Level: {}\n", self.replication_level));
        result.push_str(&format!("  - Replica Entries: {}\n", self.replica_count));
        result.push_str(&format!("Dataset Size: {} bytes\n", self.dataset_len));
        result.push_str(&format!("Stored Size: {} bytes\n", self.stored_bytes()));

        if self.has_shards() {
            result.push_str(&format!("Avg. Shard Size: {:.2} bytes\n", self.avg_shard_size()));
            result.push_str(&format!("Smallest Shard: {} bytes\n", self.smallest_shard));
            result.push_str(&format!("Largest Shard: {} bytes\n", self.largest_shard));
        }

        result
    }
}

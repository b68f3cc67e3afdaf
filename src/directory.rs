//! Directory of shard and replica ranges
//!
//! The directory is the single source of truth for the layout: every key
//! (`"i"` for primaries, `"i-level"` for replicas) maps to the byte range the
//! entry covers. A [`DirectoryStore`] persists whole snapshots of it, along
//! with the journal of an in-flight rebalance.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::shard::{ShardId, ShardKey, ShardRange, ShardStats};
use crate::util;

/// Mapping from shard/replica identifier to its byte range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directory {
    entries: BTreeMap<ShardKey, ShardRange>,
}

impl Directory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory for `ranges.len()` primaries, each with replicas at
    /// levels `1..=level`
    pub fn from_ranges(ranges: &[ShardRange], level: u32) -> Self {
        let mut directory = Self::new();
        for (shard, range) in ranges.iter().enumerate() {
            let shard = shard as ShardId;
            directory.put(ShardKey::primary(shard), *range);
            for level in 1..=level {
                directory.put(ShardKey::replica(shard, level), *range);
            }
        }
        directory
    }

    /// Look up an entry
    pub fn get(&self, key: &ShardKey) -> Option<ShardRange> {
        self.entries.get(key).copied()
    }

    /// Insert or replace an entry
    pub fn put(&mut self, key: ShardKey, range: ShardRange) {
        self.entries.insert(key, range);
    }

    /// Remove an entry
    pub fn delete(&mut self, key: &ShardKey) -> Option<ShardRange> {
        self.entries.remove(key)
    }

    /// Check if an entry exists
    pub fn contains(&self, key: &ShardKey) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys, primaries first, each group in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &ShardKey> + '_ {
        self.entries.keys()
    }

    /// All keys rendered as strings
    pub fn key_strings(&self) -> Vec<String> {
        self.entries.keys().map(ShardKey::to_string).collect()
    }

    /// All entries
    pub fn iter(&self) -> impl Iterator<Item = (&ShardKey, &ShardRange)> + '_ {
        self.entries.iter()
    }

    /// Number of entries (primaries and replicas)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the directory has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Primary shard ids in ascending order
    pub fn primary_ids(&self) -> Vec<ShardId> {
        self.entries
            .keys()
            .filter_map(|key| match key {
                ShardKey::Primary(shard) => Some(*shard),
                ShardKey::Replica { .. } => None,
            })
            .collect()
    }

    /// Primary entries in ascending shard order
    pub fn primaries(&self) -> impl Iterator<Item = (ShardId, ShardRange)> + '_ {
        self.entries.iter().filter_map(|(key, range)| match key {
            ShardKey::Primary(shard) => Some((*shard, *range)),
            ShardKey::Replica { .. } => None,
        })
    }

    /// Replica keys
    pub fn replica_keys(&self) -> impl Iterator<Item = &ShardKey> + '_ {
        self.entries.keys().filter(|key| key.is_replica())
    }

    /// Number of primary shards
    pub fn shard_count(&self) -> usize {
        self.primaries().count()
    }

    /// Highest replication level referenced by any key, 0 if none
    pub fn replication_level(&self) -> u32 {
        self.entries.keys().map(ShardKey::level).max().unwrap_or(0)
    }

    /// Length of the logical dataset: the end of the highest primary
    pub fn dataset_len(&self) -> u64 {
        self.primaries().last().map(|(_, range)| range.end).unwrap_or(0)
    }

    /// Check the layout invariants: primaries `[0, N)`, contiguous ranges
    /// starting at 0, and uniform replicas mirroring their parents
    pub fn validate(&self) -> Result<()> {
        let mut expected_start = 0u64;
        for (position, (shard, range)) in self.primaries().enumerate() {
            if shard as usize != position {
                return Err(Error::corruption(format!(
                    "Primary shard ids are not contiguous: expected {}, found {}",
                    position, shard
                )));
            }
            if range.start != expected_start || range.end < range.start {
                return Err(Error::corruption(format!(
                    "Shard {} covers {}..{} but should start at {}",
                    shard, range.start, range.end, expected_start
                )));
            }
            expected_start = range.end;
        }

        let level = self.replication_level();
        for (shard, range) in self.primaries() {
            for level in 1..=level {
                match self.get(&ShardKey::replica(shard, level)) {
                    Some(replica) if replica == range => {}
                    Some(_) => {
                        return Err(Error::corruption(format!(
                            "Replica {}-{} does not mirror its primary range",
                            shard, level
                        )))
                    }
                    None => {
                        return Err(Error::corruption(format!(
                            "Replica {}-{} is missing",
                            shard, level
                        )))
                    }
                }
            }
        }

        for key in self.replica_keys() {
            if !self.contains(&key.parent()) {
                return Err(Error::corruption(format!(
                    "Replica {} has no primary",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Summarize the layout
    pub fn stats(&self) -> ShardStats {
        let mut stats = ShardStats::new();
        stats.shard_count = self.shard_count();
        stats.replication_level = self.replication_level();
        stats.replica_count = self.replica_keys().count();
        stats.dataset_len = self.dataset_len();
        stats.smallest_shard = self.primaries().map(|(_, r)| r.len()).min().unwrap_or(0);
        stats.largest_shard = self.primaries().map(|(_, r)| r.len()).max().unwrap_or(0);
        stats
    }
}

/// One staged content entry waiting to be moved onto its final key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRename {
    /// Staging key the content was written under
    pub from: String,
    /// Final key the content belongs to
    pub to: String,
}

/// Journal of a rebalance that has been committed but not fully applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSwap {
    /// Directory of the new generation
    pub directory: Directory,
    /// Staged content to move into place
    pub renames: Vec<StagedRename>,
    /// Keys of the old generation with no place in the new one
    pub retire: Vec<String>,
}

/// Persistence boundary for the directory
pub trait DirectoryStore: Send + Sync {
    /// Load the last saved directory, empty if none was ever saved
    fn load(&self) -> Result<Directory>;

    /// Replace the saved directory
    fn save(&self, directory: &Directory) -> Result<()>;

    /// Load the journal of an interrupted rebalance, if any
    fn load_pending(&self) -> Result<Option<PendingSwap>>;

    /// Persist the journal of a rebalance about to be applied
    fn save_pending(&self, pending: &PendingSwap) -> Result<()>;

    /// Remove the rebalance journal
    fn clear_pending(&self) -> Result<()>;
}

/// Directory persisted as a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonDirectoryStore {
    path: PathBuf,
    pending_path: PathBuf,
    sync_writes: bool,
}

impl JsonDirectoryStore {
    /// Create a store backed by the JSON file at `path`
    pub fn new<P: AsRef<Path>>(path: P, sync_writes: bool) -> Self {
        let path = path.as_ref().to_path_buf();
        let pending_path = path.with_extension("pending.json");
        Self {
            path,
            pending_path,
            sync_writes,
        }
    }

    /// Path of the directory file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the rebalance journal
    pub fn pending_path(&self) -> &Path {
        &self.pending_path
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>> {
        let Some(bytes) = util::read_if_exists(path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            Error::corruption(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let text = serde_json::to_vec_pretty(value)?;
        util::write_atomic(path, &text, self.sync_writes)?;
        Ok(())
    }
}

impl DirectoryStore for JsonDirectoryStore {
    fn load(&self) -> Result<Directory> {
        Ok(self.read_json(&self.path)?.unwrap_or_default())
    }

    fn save(&self, directory: &Directory) -> Result<()> {
        self.write_json(&self.path, directory)
    }

    fn load_pending(&self) -> Result<Option<PendingSwap>> {
        self.read_json(&self.pending_path)
    }

    fn save_pending(&self, pending: &PendingSwap) -> Result<()> {
        self.write_json(&self.pending_path, pending)
    }

    fn clear_pending(&self) -> Result<()> {
        util::remove_if_exists(&self.pending_path)?;
        Ok(())
    }
}

/// Directory kept in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryDirectoryStore {
    directory: RwLock<Directory>,
    pending: RwLock<Option<PendingSwap>>,
}

impl MemoryDirectoryStore {
    /// Create an empty in-memory directory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryStore for MemoryDirectoryStore {
    fn load(&self) -> Result<Directory> {
        Ok(self.directory.read().clone())
    }

    fn save(&self, directory: &Directory) -> Result<()> {
        *self.directory.write() = directory.clone();
        Ok(())
    }

    fn load_pending(&self) -> Result<Option<PendingSwap>> {
        Ok(self.pending.read().clone())
    }

    fn save_pending(&self, pending: &PendingSwap) -> Result<()> {
        *self.pending.write() = Some(pending.clone());
        Ok(())
    }

    fn clear_pending(&self) -> Result<()> {
        *self.pending.write() = None;
        Ok(())
    }
}

//! Building and rebalancing the primary generation
//!
//! A rebalance never edits shards in place. The dataset is reassembled from
//! the current primaries, split into the new count, and the new pieces are
//! written under staging keys. Once every piece is staged, a [`PendingSwap`]
//! journal is saved; that is the commit point. The swap then moves staged
//! content onto the final keys, retires keys the new layout no longer has and
//! saves the new directory. A journal left behind by a crash is rolled
//! forward before the next operation, so callers observe either the old
//! generation or the new one.

use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directory::{Directory, PendingSwap, StagedRename};
use crate::error::{Error, Result};
use crate::handler::ShardHandler;
use crate::shard::{partition, ranges_for, ShardId, ShardKey};

/// Prefix of content keys holding a staged generation
pub const STAGE_PREFIX: &str = "stage-";

impl ShardHandler {
    /// Partition `data` into `count` shards on an empty store
    ///
    /// Returns the number of shards created.
    pub fn build(&self, count: usize, data: &[u8]) -> Result<usize> {
        let _guard = self.lock.acquire()?;
        self.roll_forward_pending()?;

        let existing = self.directory_store.load()?;
        if !existing.is_empty() {
            return Err(Error::AlreadyPartitioned {
                shards: existing.shard_count(),
            });
        }

        let pieces = partition(data, count)?;
        let ranges = ranges_for(pieces.iter().map(|piece| piece.len()));

        // Content written before the directory is saved is an orphan until
        // then, so a failure here leaves the store unpartitioned
        for (shard, piece) in pieces.iter().enumerate() {
            self.write_content(&ShardKey::primary(shard as ShardId).to_string(), piece)?;
        }

        let directory = Directory::from_ranges(&ranges, 0);
        self.save_directory(&directory)?;
        self.metrics.increment_builds();

        info!(shards = count, bytes = data.len(), "built shard setup");

        self.reconcile_locked()?;
        Ok(count)
    }

    /// Rebalance the dataset onto one more shard
    ///
    /// Returns the new shard count.
    pub fn add_shard(&self) -> Result<usize> {
        self.rebalance(|current| current + 1)
    }

    /// Rebalance the dataset onto one fewer shard, never fewer than one
    ///
    /// Returns the new shard count.
    pub fn remove_shard(&self) -> Result<usize> {
        self.rebalance(|current| current.saturating_sub(1).max(1))
    }

    fn rebalance(&self, target: impl FnOnce(usize) -> usize) -> Result<usize> {
        let start = Instant::now();
        let _guard = self.lock.acquire()?;
        self.roll_forward_pending()?;

        let current = self.directory_store.load()?;
        let current_count = current.shard_count();
        if current_count == 0 {
            return Err(Error::NotPartitioned);
        }

        let data = self.reconstruct(&current)?;
        let new_count = target(current_count);
        let level = current.replication_level();

        let pieces = partition(&data, new_count)?;
        let ranges = ranges_for(pieces.iter().map(|piece| piece.len()));
        let directory = Directory::from_ranges(&ranges, level);

        let renames = self.stage(&pieces)?;
        let retire = current
            .keys()
            .filter(|key| !directory.contains(key))
            .map(ShardKey::to_string)
            .collect();

        let pending = PendingSwap {
            directory,
            renames,
            retire,
        };

        if let Err(e) = self.directory_store.save_pending(&pending) {
            self.discard_staged(&pending.renames);
            return Err(e);
        }

        self.apply_swap(&pending)?;

        self.metrics.increment_rebalances();
        self.metrics.record_rebalance_duration(start.elapsed());
        info!(from = current_count, to = new_count, level, "rebalanced shards");

        self.reconcile_locked()?;
        Ok(new_count)
    }

    /// Write every piece under a fresh staging key
    ///
    /// On failure the pieces already staged are deleted and the error returned.
    fn stage(&self, pieces: &[&[u8]]) -> Result<Vec<StagedRename>> {
        let generation = Uuid::new_v4().simple().to_string();
        let mut renames = Vec::with_capacity(pieces.len());

        for (shard, piece) in pieces.iter().enumerate() {
            let rename = StagedRename {
                from: format!("{}{}-{}", STAGE_PREFIX, generation, shard),
                to: ShardKey::primary(shard as ShardId).to_string(),
            };

            if let Err(e) = self.write_content(&rename.from, piece) {
                renames.push(rename);
                self.discard_staged(&renames);
                return Err(e);
            }
            renames.push(rename);
        }

        debug!(generation = %generation, pieces = pieces.len(), "staged new generation");
        Ok(renames)
    }

    /// Best-effort removal of staged content after a failed rebalance
    ///
    /// Anything left behind is an orphan and goes at the next reconciliation.
    fn discard_staged(&self, renames: &[StagedRename]) {
        for rename in renames {
            if let Err(e) = self.content.delete(&rename.from) {
                warn!(key = %rename.from, error = %e, "failed to discard staged content");
            }
        }
    }

    /// Move a committed generation into place; safe to repeat
    fn apply_swap(&self, pending: &PendingSwap) -> Result<()> {
        for rename in &pending.renames {
            // Absent staging keys were moved by an earlier attempt
            if self.content.contains(&rename.from)? {
                self.content.rename(&rename.from, &rename.to)?;
            }
        }

        for key in &pending.retire {
            self.content.delete(key)?;
        }

        self.save_directory(&pending.directory)?;
        self.directory_store.clear_pending()?;
        Ok(())
    }

    /// Finish a rebalance interrupted after its commit point
    ///
    /// Returns whether a journal was found. The caller holds the writer lock.
    pub(crate) fn roll_forward_pending(&self) -> Result<bool> {
        let Some(pending) = self.directory_store.load_pending()? else {
            return Ok(false);
        };

        warn!(
            shards = pending.directory.shard_count(),
            renames = pending.renames.len(),
            "finishing interrupted rebalance"
        );
        self.apply_swap(&pending)?;
        self.metrics.increment_roll_forwards();
        Ok(true)
    }
}

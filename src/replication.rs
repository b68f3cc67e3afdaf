//! Uniform replication tiers
//!
//! Replication adds or removes exactly one level across every primary at a
//! time. The level in force is the highest replica level the directory names,
//! never whatever happens to be in the content store.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::handler::ShardHandler;
use crate::reconcile::ReconcileReport;
use crate::shard::{ShardId, ShardKey};

impl ShardHandler {
    /// Copy every primary to a new replica level `R + 1`
    ///
    /// Returns the new replication level. Replica content is written before
    /// the directory names it, so the new level becomes visible for all
    /// shards at once or not at all.
    pub fn add_replication(&self) -> Result<u32> {
        let _guard = self.lock.acquire()?;
        self.roll_forward_pending()?;

        let mut directory = self.directory_store.load()?;
        if directory.is_empty() {
            return Err(Error::NotPartitioned);
        }

        let current = directory.replication_level();
        let level = current + 1;

        let mut sources = Vec::with_capacity(directory.shard_count());
        let mut lost = Vec::new();
        for (shard, range) in directory.primaries() {
            match self.read_shard(shard, range, current)? {
                Some(bytes) => sources.push((shard, range, bytes)),
                None => lost.push(shard),
            }
        }

        if !lost.is_empty() {
            return Err(Error::IntegrityLoss {
                report: ReconcileReport {
                    lost_shards: lost.clone(),
                    ..Default::default()
                },
                shards: lost,
            });
        }

        let mut written = Vec::with_capacity(sources.len());
        for (shard, _, bytes) in &sources {
            let key = ShardKey::replica(*shard, level).to_string();
            if let Err(e) = self.write_content(&key, bytes) {
                self.discard_replicas(&written);
                return Err(e);
            }
            written.push(key);
        }

        for (shard, range, _) in &sources {
            directory.put(ShardKey::replica(*shard, level), *range);
        }
        if let Err(e) = self.save_directory(&directory) {
            self.discard_replicas(&written);
            return Err(e);
        }

        self.metrics.increment_replication_changes();
        info!(level, shards = sources.len(), "added replication level");

        self.reconcile_locked()?;
        Ok(level)
    }

    /// Drop the highest replica level
    ///
    /// Returns the new replication level, or [`Error::NoReplication`] when
    /// there is nothing to remove.
    pub fn remove_replication(&self) -> Result<u32> {
        let _guard = self.lock.acquire()?;
        self.roll_forward_pending()?;

        let mut directory = self.directory_store.load()?;
        let level = directory.replication_level();
        if level == 0 {
            return Err(Error::NoReplication);
        }

        let retired: Vec<ShardKey> = directory
            .replica_keys()
            .filter(|key| key.level() == level)
            .copied()
            .collect();
        for key in &retired {
            directory.delete(key);
        }

        // Once the directory stops naming them, leftovers are orphans
        self.save_directory(&directory)?;
        for key in &retired {
            self.content.delete(&key.to_string())?;
        }

        self.metrics.increment_replication_changes();
        info!(level = level - 1, removed = retired.len(), "removed replication level");

        self.reconcile_locked()?;
        Ok(level - 1)
    }

    fn discard_replicas(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.content.delete(key) {
                warn!(key = %key, error = %e, "failed to discard partial replica");
            }
        }
    }

    /// Shards whose replicas at `level` are present in the directory
    pub fn replicated_shards(&self, level: u32) -> Vec<ShardId> {
        self.get_all_shard_info()
            .replica_keys()
            .filter(|key| key.level() == level)
            .map(ShardKey::shard)
            .collect()
    }
}

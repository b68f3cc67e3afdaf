//! Reconciliation of the directory against stored content
//!
//! The directory is the source of truth. A pass runs in a fixed order:
//!
//! 1. normalise the directory so every primary has replica entries for
//!    levels `1..=R` mirroring its range;
//! 2. delete stored content that the directory does not name (orphans), so a
//!    stale file can never be used as a recovery source;
//! 3. restore missing or truncated primaries from their lowest surviving
//!    replica, recording shards with no surviving copy as lost;
//! 4. recopy missing or diverged replicas from their primary;
//! 5. persist the directory.
//!
//! A pass is idempotent: running it twice leaves the same state as running
//! it once.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::handler::ShardHandler;
use crate::shard::{ShardId, ShardKey, ShardRange};

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Content keys deleted because the directory does not name them
    pub orphans_removed: Vec<String>,
    /// Primaries rewritten from a replica
    pub primaries_recovered: Vec<ShardId>,
    /// Replica keys rewritten from their primary
    pub replicas_repaired: Vec<String>,
    /// Shards whose primary and replicas are all gone
    pub lost_shards: Vec<ShardId>,
}

impl ReconcileReport {
    /// Check if the pass found nothing to repair
    pub fn is_clean(&self) -> bool {
        self.orphans_removed.is_empty()
            && self.primaries_recovered.is_empty()
            && self.replicas_repaired.is_empty()
            && self.lost_shards.is_empty()
    }

    /// Number of content entries written or deleted
    pub fn total_repairs(&self) -> usize {
        self.orphans_removed.len() + self.primaries_recovered.len() + self.replicas_repaired.len()
    }
}

impl ShardHandler {
    /// Make the content store agree with the directory
    ///
    /// Shards that lost every copy are reported through
    /// [`Error::IntegrityLoss`] after all other shards have been repaired and
    /// the directory saved.
    pub fn sync_replication(&self) -> Result<ReconcileReport> {
        let _guard = self.lock.acquire()?;
        self.roll_forward_pending()?;
        self.reconcile_locked()
    }

    /// Reconciliation body; the caller holds the writer lock
    pub(crate) fn reconcile_locked(&self) -> Result<ReconcileReport> {
        let start = Instant::now();
        let mut directory = self.directory_store.load()?;
        let mut report = ReconcileReport::default();

        let level = normalize(&mut directory);

        // Orphans go first so they never serve as a recovery source
        let expected: BTreeSet<String> = directory.key_strings().into_iter().collect();
        for key in self.content.list_keys()? {
            if !expected.contains(&key) {
                debug!(key = %key, "removing orphaned content");
                self.content.delete(&key)?;
                report.orphans_removed.push(key);
            }
        }

        let primaries: Vec<(ShardId, ShardRange)> = directory.primaries().collect();
        for (shard, range) in primaries {
            let Some(primary) = self.restore_primary(shard, range, level, &mut report)? else {
                warn!(shard, "primary and all replicas lost");
                report.lost_shards.push(shard);
                continue;
            };

            for replica_level in 1..=level {
                let key = ShardKey::replica(shard, replica_level).to_string();
                let healthy = match self.read_content(&key)? {
                    Some(bytes) if self.config().verify_replica_content => bytes == primary,
                    Some(bytes) => bytes.len() == primary.len(),
                    None => false,
                };

                if !healthy {
                    debug!(key = %key, "recopying replica from primary");
                    self.write_content(&key, &primary)?;
                    report.replicas_repaired.push(key);
                }
            }
        }

        self.save_directory(&directory)?;

        let duration = start.elapsed();
        self.metrics.record_reconcile(&report, duration);

        if report.is_clean() {
            debug!(shards = directory.shard_count(), level, "reconciliation found nothing to repair");
        } else {
            info!(
                orphans = report.orphans_removed.len(),
                recovered = report.primaries_recovered.len(),
                repaired = report.replicas_repaired.len(),
                lost = report.lost_shards.len(),
                "reconciliation repaired store"
            );
        }

        if !report.lost_shards.is_empty() {
            return Err(Error::IntegrityLoss {
                shards: report.lost_shards.clone(),
                report,
            });
        }

        Ok(report)
    }

    /// Current bytes of a primary, restoring them from a replica if needed
    ///
    /// The source is the lowest replica level whose length matches the
    /// directory range, falling back to the lowest surviving level only when
    /// none matches and the primary is missing. Returns `None` when neither
    /// the primary nor any replica survives.
    fn restore_primary(
        &self,
        shard: ShardId,
        range: ShardRange,
        level: u32,
        report: &mut ReconcileReport,
    ) -> Result<Option<Vec<u8>>> {
        let key = ShardKey::primary(shard).to_string();
        let current = self.read_content(&key)?;

        if let Some(bytes) = &current {
            if bytes.len() as u64 == range.len() {
                return Ok(current);
            }
        }

        let mut survivors = Vec::new();
        for replica_level in 1..=level {
            if let Some(bytes) = self.read_content(&ShardKey::replica(shard, replica_level).to_string())? {
                survivors.push((replica_level, bytes));
            }
        }

        // Prefer the lowest replica whose length matches the directory
        let source = survivors
            .iter()
            .position(|(_, bytes)| bytes.len() as u64 == range.len())
            .or(if current.is_none() && !survivors.is_empty() { Some(0) } else { None });

        match source {
            Some(index) => {
                let (replica_level, bytes) = survivors.swap_remove(index);
                warn!(shard, replica_level, "restoring primary from replica");
                self.write_content(&key, &bytes)?;
                report.primaries_recovered.push(shard);
                Ok(Some(bytes))
            }
            None => {
                if current.is_some() {
                    warn!(
                        shard,
                        expected = range.len(),
                        "primary length disagrees with the directory and no replica matches"
                    );
                }
                Ok(current)
            }
        }
    }
}

/// Bring replica entries in line with the primaries; returns the level `R`
///
/// Replica entries without a primary are dropped, missing levels are added
/// and every replica range is reset to its parent's.
fn normalize(directory: &mut Directory) -> u32 {
    let dangling: Vec<ShardKey> = directory
        .replica_keys()
        .filter(|key| !directory.contains(&key.parent()))
        .copied()
        .collect();
    for key in &dangling {
        debug!(key = %key, "dropping replica entry without a primary");
        directory.delete(key);
    }

    let level = directory.replication_level();
    let primaries: Vec<(ShardId, ShardRange)> = directory.primaries().collect();
    for (shard, range) in primaries {
        for replica_level in 1..=level {
            let key = ShardKey::replica(shard, replica_level);
            if directory.get(&key) != Some(range) {
                debug!(key = %key, "restoring replica entry in directory");
                directory.put(key, range);
            }
        }
    }

    level
}

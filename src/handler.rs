//! Shard handler
//!
//! [`ShardHandler`] ties a directory store, a content store and the writer
//! lock together. The operations themselves live in `rebalance`,
//! `replication` and `reconcile`; this module holds construction, queries
//! and the read helpers they share.

use std::fs;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::content::{ContentStore, FsContentStore, MemoryContentStore};
use crate::directory::{Directory, DirectoryStore, JsonDirectoryStore, MemoryDirectoryStore};
use crate::error::{Error, Result};
use crate::lock::StoreLock;
use crate::metrics::MetricsCollector;
use crate::shard::{ShardId, ShardKey, ShardRange, ShardStats};

/// Entry point for every shard operation
///
/// A handler owns one directory store and one content store. Mutating
/// operations (`build`, `add_shard`, `remove_shard`, `add_replication`,
/// `remove_replication`, `sync_replication`) hold the writer lock for their
/// whole duration and end with a reconciliation pass. Queries read the last
/// persisted directory snapshot without locking.
pub struct ShardHandler {
    /// Store configuration
    config: StoreConfig,
    /// Directory persistence
    pub(crate) directory_store: Arc<dyn DirectoryStore>,
    /// Content persistence
    pub(crate) content: Arc<dyn ContentStore>,
    /// Writer lock
    pub(crate) lock: StoreLock,
    /// Last persisted directory
    snapshot: RwLock<Arc<Directory>>,
    /// Metrics collector
    pub(crate) metrics: Arc<MetricsCollector>,
}

impl ShardHandler {
    /// Open an on-disk store described by `config`
    ///
    /// Finishes any rebalance that was interrupted by a crash.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.base_dir)?;

        let content = FsContentStore::open(
            config.data_path(),
            config.content_extension.clone(),
            config.sync_writes,
        )?;
        let directory_store = JsonDirectoryStore::new(config.directory_path(), config.sync_writes);
        let lock = match config.lock_path() {
            Some(path) => StoreLock::with_file(path)?,
            None => StoreLock::in_process(),
        };

        let handler = Self::from_parts(config, Arc::new(directory_store), Arc::new(content), lock)?;
        handler.recover()?;
        Ok(handler)
    }

    /// Create a handler over caller-supplied stores
    pub fn with_stores(
        config: StoreConfig,
        directory_store: Arc<dyn DirectoryStore>,
        content: Arc<dyn ContentStore>,
    ) -> Result<Self> {
        config.validate()?;
        let handler = Self::from_parts(config, directory_store, content, StoreLock::in_process())?;
        handler.recover()?;
        Ok(handler)
    }

    /// Create a handler backed entirely by memory
    pub fn in_memory() -> Result<Self> {
        Self::with_stores(
            StoreConfig::default(),
            Arc::new(MemoryDirectoryStore::new()),
            Arc::new(MemoryContentStore::new()),
        )
    }

    fn from_parts(
        config: StoreConfig,
        directory_store: Arc<dyn DirectoryStore>,
        content: Arc<dyn ContentStore>,
        lock: StoreLock,
    ) -> Result<Self> {
        let directory = directory_store.load()?;
        Ok(Self {
            config,
            directory_store,
            content,
            lock,
            snapshot: RwLock::new(Arc::new(directory)),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// Finish an interrupted rebalance, if the journal shows one
    fn recover(&self) -> Result<()> {
        let _guard = self.lock.acquire()?;
        if !self.roll_forward_pending()? {
            return Ok(());
        }

        match self.reconcile_locked() {
            Ok(_) => Ok(()),
            Err(Error::IntegrityLoss { shards, .. }) => {
                warn!(?shards, "recovered store has shards with no surviving copy");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // Queries

    /// Directory entry for `id` (`"i"` or `"i-level"`)
    pub fn get_shard_info(&self, id: &str) -> Result<ShardRange> {
        let snapshot = self.snapshot();
        id.parse::<ShardKey>()
            .ok()
            .and_then(|key| snapshot.get(&key))
            .ok_or_else(|| Error::invalid_identifier(id, snapshot.key_strings()))
    }

    /// The whole directory as last persisted
    pub fn get_all_shard_info(&self) -> Arc<Directory> {
        self.snapshot()
    }

    /// Number of primary shards
    pub fn shard_count(&self) -> usize {
        self.snapshot().shard_count()
    }

    /// Current uniform replication level
    pub fn replication_level(&self) -> u32 {
        self.snapshot().replication_level()
    }

    /// Summary of the current layout
    pub fn stats(&self) -> ShardStats {
        self.snapshot().stats()
    }

    /// Reload the snapshot from the directory store, picking up changes made
    /// by other handlers
    pub fn refresh(&self) -> Result<Arc<Directory>> {
        let directory = Arc::new(self.directory_store.load()?);
        *self.snapshot.write() = directory.clone();
        Ok(directory)
    }

    /// Reassemble the dataset from the current primaries
    pub fn read_dataset(&self) -> Result<Vec<u8>> {
        let _guard = self.lock.acquire()?;
        self.roll_forward_pending()?;
        let directory = self.directory_store.load()?;
        self.reconstruct(&directory)
    }

    /// Get the store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the metrics collector
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Get the content store
    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    // Internal helpers shared by the operation modules

    fn snapshot(&self) -> Arc<Directory> {
        self.snapshot.read().clone()
    }

    /// Persist `directory` and publish it to queries
    pub(crate) fn save_directory(&self, directory: &Directory) -> Result<()> {
        self.directory_store.save(directory)?;
        *self.snapshot.write() = Arc::new(directory.clone());
        debug!(entries = directory.len(), "directory saved");
        Ok(())
    }

    /// Read a content entry, counting the bytes
    pub(crate) fn read_content(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let data = self.content.get(key)?;
        if let Some(bytes) = &data {
            self.metrics.add_bytes_read(bytes.len());
        }
        Ok(data)
    }

    /// Write a content entry, counting the bytes
    pub(crate) fn write_content(&self, key: &str, data: &[u8]) -> Result<()> {
        self.content.put(key, data)?;
        self.metrics.add_bytes_written(data.len());
        Ok(())
    }

    /// Bytes of `shard` whose length matches `range`
    ///
    /// The primary is used when it fits, else the lowest replica that does.
    /// Returns `None` when no copy survives and [`Error::Corruption`] when
    /// copies survive but none has the length the directory records.
    pub(crate) fn read_shard(
        &self,
        shard: ShardId,
        range: ShardRange,
        level: u32,
    ) -> Result<Option<Vec<u8>>> {
        let mut survived = false;

        if let Some(bytes) = self.read_content(&ShardKey::primary(shard).to_string())? {
            if bytes.len() as u64 == range.len() {
                return Ok(Some(bytes));
            }
            warn!(shard, expected = range.len(), actual = bytes.len(), "primary length disagrees with the directory");
            survived = true;
        }

        for level in 1..=level {
            let key = ShardKey::replica(shard, level);
            if let Some(bytes) = self.read_content(&key.to_string())? {
                if bytes.len() as u64 == range.len() {
                    warn!(shard, replica = %key, "reading shard from replica");
                    return Ok(Some(bytes));
                }
                survived = true;
            }
        }

        if survived {
            return Err(Error::corruption(format!(
                "No copy of shard {} has the {} bytes its range {}..{} requires",
                shard,
                range.len(),
                range.start,
                range.end
            )));
        }
        Ok(None)
    }

    /// Concatenate all primaries in ascending id order
    pub(crate) fn reconstruct(&self, directory: &Directory) -> Result<Vec<u8>> {
        let level = directory.replication_level();
        let mut data = Vec::with_capacity(directory.dataset_len() as usize);
        let mut lost = Vec::new();

        for (shard, range) in directory.primaries() {
            match self.read_shard(shard, range, level)? {
                Some(bytes) => data.extend_from_slice(&bytes),
                None => lost.push(shard),
            }
        }

        if !lost.is_empty() {
            return Err(Error::IntegrityLoss {
                report: crate::reconcile::ReconcileReport {
                    lost_shards: lost.clone(),
                    ..Default::default()
                },
                shards: lost,
            });
        }

        info!(bytes = data.len(), shards = directory.shard_count(), "dataset reassembled");
        Ok(data)
    }
}

impl std::fmt::Debug for ShardHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardHandler")
            .field("config", &self.config)
            .field("directory", &self.snapshot())
            .field("lock", &self.lock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_queries_on_fresh_store() -> Result<()> {
        let handler = ShardHandler::in_memory()?;
        assert_eq!(handler.shard_count(), 0);
        assert_eq!(handler.replication_level(), 0);
        assert!(handler.get_all_shard_info().is_empty());

        let err = handler.get_shard_info("0").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { ref valid, .. } if valid.is_empty()));
        Ok(())
    }

    #[test]
    fn test_get_shard_info() -> Result<()> {
        let handler = ShardHandler::in_memory()?;
        handler.build(5, b"abcdefghij")?;

        assert_eq!(handler.get_shard_info("3")?, ShardRange::new(6, 8));

        match handler.get_shard_info("7") {
            Err(Error::InvalidIdentifier { id, valid }) => {
                assert_eq!(id, "7");
                assert_eq!(valid, vec!["0", "1", "2", "3", "4"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // Malformed ids are reported the same way
        assert!(matches!(
            handler.get_shard_info("three"),
            Err(Error::InvalidIdentifier { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_open_on_disk() -> Result<()> {
        let temp_dir = tempdir()?;
        let config = StoreConfig::new().with_base_dir(temp_dir.path());

        {
            let handler = ShardHandler::open(config.clone())?;
            handler.build(2, b"hello world")?;
        }

        assert!(temp_dir.path().join("mapping.json").is_file());
        assert!(temp_dir.path().join("data").join("0.txt").is_file());
        assert!(temp_dir.path().join("data").join("1.txt").is_file());

        let handler = ShardHandler::open(config)?;
        assert_eq!(handler.shard_count(), 2);
        assert_eq!(handler.get_shard_info("1")?, ShardRange::new(5, 11));
        assert_eq!(handler.read_dataset()?, b"hello world");
        Ok(())
    }

    #[test]
    fn test_refresh_sees_other_handler() -> Result<()> {
        let temp_dir = tempdir()?;
        let config = StoreConfig::new().with_base_dir(temp_dir.path());

        let reader = ShardHandler::open(config.clone())?;
        let writer = ShardHandler::open(config)?;
        writer.build(3, b"abcdef")?;

        // The reader's snapshot is stale until refreshed
        assert_eq!(reader.shard_count(), 0);
        reader.refresh()?;
        assert_eq!(reader.shard_count(), 3);
        Ok(())
    }
}

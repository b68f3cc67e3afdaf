//! # shardvault
//!
//! Contiguous sharding of a single dataset with uniform replication.
//!
//! A dataset is split into `N` gapless, order-preserving shards. A persisted
//! [`Directory`] maps every shard (`"i"`) and replica (`"i-level"`) to the
//! byte range it covers and is the source of truth for the layout. Stored
//! content is reconciled against it after every mutation: orphans are
//! removed, lost primaries are restored from replicas and stale replicas are
//! recopied.
//!
//! ```no_run
//! use shardvault::{ShardHandler, StoreConfig};
//!
//! # fn main() -> shardvault::Result<()> {
//! let handler = ShardHandler::open(StoreConfig::new().with_base_dir("./store"))?;
//! handler.build(5, b"abcdefghij")?;
//! handler.add_replication()?;
//!
//! assert_eq!(handler.get_shard_info("2-1")?.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content;
pub mod directory;
pub mod error;
pub mod handler;
pub mod lock;
pub mod metrics;
pub mod rebalance;
pub mod reconcile;
pub mod replication;
pub mod shard;
mod util;

pub use config::StoreConfig;
pub use content::{ContentStore, FsContentStore, MemoryContentStore};
pub use directory::{Directory, DirectoryStore, JsonDirectoryStore, MemoryDirectoryStore, PendingSwap, StagedRename};
pub use error::{Error, Result};
pub use handler::ShardHandler;
pub use lock::{StoreLock, WriteGuard};
pub use metrics::MetricsCollector;
pub use reconcile::ReconcileReport;
pub use shard::{partition, ranges_for, ShardError, ShardId, ShardKey, ShardRange, ShardStats};

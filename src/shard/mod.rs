//! Shard identifiers, ranges and partitioning
//!
//! A dataset is split into `N` contiguous shards addressed by ordinal. Each
//! shard may carry replicas at levels `1..=R`, addressed as `"i-level"`.

mod error;
mod info;
mod key;
mod partition;

pub use error::{ShardError, ShardResult};
pub use info::{ShardRange, ShardStats};
pub use key::ShardKey;
pub use partition::{partition, ranges_for};

/// Shard ordinal type
pub type ShardId = u32;

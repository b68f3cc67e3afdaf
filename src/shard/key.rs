//! Shard and replica identifiers
//!
//! Primaries are addressed as `"i"`, replicas as `"i-level"`. The same
//! textual form is used for directory keys and content-store keys.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::shard::{ShardError, ShardId, ShardResult};

/// Identifier of one directory / content entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShardKey {
    /// Primary copy of shard `i`
    Primary(ShardId),
    /// Replica of `shard` at replication `level` (1-based)
    Replica {
        /// Parent shard
        shard: ShardId,
        /// Replication level
        level: u32,
    },
}

impl ShardKey {
    /// Create a primary key
    pub fn primary(shard: ShardId) -> Self {
        Self::Primary(shard)
    }

    /// Create a replica key
    pub fn replica(shard: ShardId, level: u32) -> Self {
        Self::Replica { shard, level }
    }

    /// Shard this entry belongs to
    pub fn shard(&self) -> ShardId {
        match *self {
            Self::Primary(shard) => shard,
            Self::Replica { shard, .. } => shard,
        }
    }

    /// Replication level, 0 for primaries
    pub fn level(&self) -> u32 {
        match *self {
            Self::Primary(_) => 0,
            Self::Replica { level, .. } => level,
        }
    }

    /// Check if this is a primary key
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary(_))
    }

    /// Check if this is a replica key
    pub fn is_replica(&self) -> bool {
        matches!(self, Self::Replica { .. })
    }

    /// Key of the primary this entry mirrors
    pub fn parent(&self) -> ShardKey {
        Self::Primary(self.shard())
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary(shard) => write!(f, "{}", shard),
            Self::Replica { shard, level } => write!(f, "{}-{}", shard, level),
        }
    }
}

fn parse_ordinal(part: &str, whole: &str) -> ShardResult<u32> {
    // u32::from_str accepts a leading '+', which would break the round trip
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ShardError::malformed(whole));
    }
    if part.len() > 1 && part.starts_with('0') {
        return Err(ShardError::malformed(whole));
    }
    part.parse().map_err(|_| ShardError::malformed(whole))
}

impl FromStr for ShardKey {
    type Err = ShardError;

    fn from_str(s: &str) -> ShardResult<Self> {
        if s.is_empty() {
            return Err(ShardError::Empty);
        }

        match s.split_once('-') {
            None => Ok(Self::Primary(parse_ordinal(s, s)?)),
            Some((shard, level)) => {
                let shard = parse_ordinal(shard, s)?;
                let level = parse_ordinal(level, s)?;
                if level == 0 {
                    return Err(ShardError::ZeroLevel(s.to_string()));
                }
                Ok(Self::Replica { shard, level })
            }
        }
    }
}

impl Serialize for ShardKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct ShardKeyVisitor;

impl<'de> Visitor<'de> for ShardKeyVisitor {
    type Value = ShardKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a shard identifier of the form `i` or `i-level`")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ShardKey, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for ShardKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(ShardKeyVisitor)
    }
}

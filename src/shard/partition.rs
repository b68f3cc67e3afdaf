//! Contiguous partitioning of a dataset
//!
//! Every piece but the last has exactly `len / count` bytes; the last piece
//! also absorbs the remainder. Existing directory snapshots depend on this
//! exact split, so the remainder is never spread across pieces.

use crate::error::{Error, Result};
use crate::shard::ShardRange;

/// Split `data` into `count` contiguous, order-preserving pieces
pub fn partition(data: &[u8], count: usize) -> Result<Vec<&[u8]>> {
    if count == 0 {
        return Err(Error::InvalidShardCount(count));
    }

    let base = data.len() / count;
    let mut pieces = Vec::with_capacity(count);

    for i in 0..count - 1 {
        pieces.push(&data[base * i..base * (i + 1)]);
    }
    pieces.push(&data[base * (count - 1)..]);

    Ok(pieces)
}

/// Accumulate piece lengths into directory ranges
///
/// Entry 0 starts at 0; every later entry starts where the previous one ended.
pub fn ranges_for<I>(lengths: I) -> Vec<ShardRange>
where
    I: IntoIterator<Item = usize>,
{
    let mut position = 0u64;
    lengths
        .into_iter()
        .map(|len| {
            let range = ShardRange::new(position, position + len as u64);
            position = range.end;
            range
        })
        .collect()
}

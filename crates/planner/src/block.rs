use model::core::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit of migration work: the closed time range `[mint, maxt]`.
///
/// Blocks are only minted by [`crate::Plan`], which checks them against the
/// migration window. Deserialization re-checks the `mint <= maxt` ordering so
/// persisted progress cannot smuggle in an inverted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub struct Block {
    mint: Timestamp,
    maxt: Timestamp,
}

impl Block {
    pub(crate) fn new(mint: Timestamp, maxt: Timestamp) -> Self {
        debug_assert!(mint <= maxt);
        Self { mint, maxt }
    }

    pub fn mint(&self) -> Timestamp {
        self.mint
    }

    pub fn maxt(&self) -> Timestamp {
        self.maxt
    }

    /// Width in milliseconds. Zero for a single-instant block.
    pub fn duration_ms(&self) -> u64 {
        (self.maxt as i128 - self.mint as i128) as u64
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.mint && ts <= self.maxt
    }

    /// Two blocks overlap when they share at least one instant.
    pub fn overlaps(&self, other: &Block) -> bool {
        self.mint <= other.maxt && other.mint <= self.maxt
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            timestamp::display(self.mint),
            timestamp::display(self.maxt)
        )
    }
}

#[derive(Serialize, Deserialize)]
struct RawBlock {
    mint: Timestamp,
    maxt: Timestamp,
}

impl TryFrom<RawBlock> for Block {
    type Error = String;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        if raw.mint > raw.maxt {
            return Err(format!(
                "block mint {} is greater than maxt {}",
                raw.mint, raw.maxt
            ));
        }
        Ok(Block::new(raw.mint, raw.maxt))
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        RawBlock {
            mint: block.mint,
            maxt: block.maxt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_inclusive() {
        let a = Block::new(0, 10);
        assert!(a.overlaps(&Block::new(10, 20)));
        assert!(!a.overlaps(&Block::new(11, 20)));
        assert!(a.overlaps(&Block::new(3, 3)));
    }

    #[test]
    fn orders_by_time() {
        let mut blocks = vec![Block::new(20, 30), Block::new(0, 9), Block::new(10, 19)];
        blocks.sort();
        assert_eq!(blocks.first().map(Block::mint), Some(0));
        assert_eq!(blocks.last().map(Block::mint), Some(20));
    }

    #[test]
    fn zero_width_block_has_zero_duration() {
        let block = Block::new(5, 5);
        assert_eq!(block.duration_ms(), 0);
        assert!(block.contains(5));
    }
}

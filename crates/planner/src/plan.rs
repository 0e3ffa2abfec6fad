use crate::{block::Block, error::PlanError, window::Window};
use model::core::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// How the window is cut into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSize {
    /// Each block spans `[cursor, cursor + ms]`, the tail block may be shorter.
    Duration(i64),
    /// Cut the window into at most this many blocks of equal duration.
    Count(u64),
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSize::Duration(ms) => write!(f, "{ms}ms"),
            BlockSize::Count(n) => write!(f, "{n} blocks"),
        }
    }
}

/// The migration plan: an immutable window plus the resolved block duration.
///
/// Block boundaries are a pure function of these fields. Block `i` is
///
/// ```text
/// mint_i = window.mint + i * (duration + 1)
/// maxt_i = min(mint_i + duration, window.maxt)
/// ```
///
/// so consecutive blocks never share an instant and their union is exactly the
/// window. The sequence can therefore be regenerated, or resumed at any index,
/// without carrying iterator state across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    window: Window,
    block_size: BlockSize,
    duration: i64,
    len: u64,
}

impl Plan {
    pub fn new(window: Window, block_size: BlockSize) -> Result<Self, PlanError> {
        let duration = resolve_duration(&window, block_size)?;
        let stride = duration as i128 + 1;
        let len = ((window.instants() - 1) / stride + 1).min(u64::MAX as i128) as u64;

        debug!(
            window = %window,
            block_size = %block_size,
            duration_ms = duration,
            blocks = len,
            "Created migration plan"
        );

        Ok(Self {
            window,
            block_size,
            duration,
            len,
        })
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Resolved width of a full block in milliseconds.
    pub fn block_duration_ms(&self) -> i64 {
        self.duration
    }

    /// Number of blocks in the full sequence.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// A plan always has at least one block, even over a zero-width window.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Validates a block request against the migration window.
    ///
    /// Containment is checked first: a request that leaves the window is
    /// reported as [`PlanError::OutOfWindow`] whether or not its bounds are
    /// ordered. Both bounds are inclusive, so `mint == maxt` is a valid
    /// single-instant block and a block equal to the whole window is valid.
    pub fn create_block(&self, mint: Timestamp, maxt: Timestamp) -> Result<Block, PlanError> {
        if !self.window.contains(mint, maxt) {
            return Err(PlanError::OutOfWindow {
                mint,
                maxt,
                window_mint: self.window.mint(),
                window_maxt: self.window.maxt(),
            });
        }

        if mint > maxt {
            return Err(PlanError::InvalidRange { mint, maxt });
        }

        Ok(Block::new(mint, maxt))
    }

    /// The `index`-th block of the sequence, or `None` past the end.
    pub fn block(&self, index: u64) -> Option<Block> {
        if index >= self.len {
            return None;
        }

        let stride = self.duration as i128 + 1;
        let mint = self.window.mint() as i128 + index as i128 * stride;
        let maxt = (mint + self.duration as i128).min(self.window.maxt() as i128);

        // Both values lie inside the window, so they fit back into i64.
        self.create_block(mint as Timestamp, maxt as Timestamp).ok()
    }

    /// Position of `block` in the sequence, if it is one of this plan's blocks.
    pub fn index_of(&self, block: &Block) -> Option<u64> {
        if !self.window.contains(block.mint(), block.maxt()) {
            return None;
        }

        let stride = self.duration as i128 + 1;
        let offset = block.mint() as i128 - self.window.mint() as i128;
        if offset % stride != 0 {
            return None;
        }

        let index = (offset / stride) as u64;
        (self.block(index).as_ref() == Some(block)).then_some(index)
    }

    /// Lazy iterator over every block, oldest first.
    pub fn blocks(&self) -> Blocks {
        self.blocks_from(0)
    }

    /// Lazy iterator starting at block `index`.
    pub fn blocks_from(&self, index: u64) -> Blocks {
        Blocks {
            plan: *self,
            next: index.min(self.len),
        }
    }

    /// Stable content hash of the window and block sizing. Two plans with the
    /// same hash produce identical block sequences.
    pub fn hash(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(&self.window.mint().to_be_bytes());
        h.update(b":");
        h.update(&self.window.maxt().to_be_bytes());
        h.update(b":");
        h.update(&self.duration.to_be_bytes());
        h.finalize().to_hex()[..16].to_string()
    }
}

fn resolve_duration(window: &Window, block_size: BlockSize) -> Result<i64, PlanError> {
    match block_size {
        BlockSize::Duration(ms) if ms <= 0 => Err(PlanError::InvalidBlockSize(format!(
            "block duration must be positive, got {ms}ms"
        ))),
        BlockSize::Duration(ms) => Ok(ms),
        BlockSize::Count(0) => Err(PlanError::InvalidBlockSize(
            "block count must be at least 1".to_string(),
        )),
        BlockSize::Count(n) => {
            // Smallest stride that fits every instant into `n` blocks.
            let n = n as i128;
            let stride = (window.instants() + n - 1) / n;
            Ok((stride - 1).min(i64::MAX as i128) as i64)
        }
    }
}

/// Index-addressed iterator over a [`Plan`]'s blocks.
#[derive(Debug, Clone)]
pub struct Blocks {
    plan: Plan,
    next: u64,
}

impl Blocks {
    /// Index of the block the next call to `next` will yield.
    pub fn position(&self) -> u64 {
        self.next
    }
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.plan.block(self.next)?;
        self.next += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len - self.next;
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Block> {
        self.next = self.next.saturating_add(n as u64).min(self.plan.len);
        self.next()
    }
}

impl ExactSizeIterator for Blocks {}

impl std::iter::FusedIterator for Blocks {}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::timestamp::MILLIS_PER_MINUTE;

    fn make_plan(mint: i64, maxt: i64, size: BlockSize) -> Plan {
        Plan::new(Window::new(mint, maxt).unwrap(), size).unwrap()
    }

    /// Asserts the blocks are ordered, pairwise disjoint and cover the window.
    fn assert_partition(plan: &Plan) {
        let blocks: Vec<Block> = plan.blocks().collect();
        assert_eq!(blocks.len() as u64, plan.len());
        assert_eq!(blocks.first().unwrap().mint(), plan.window().mint());
        assert_eq!(blocks.last().unwrap().maxt(), plan.window().maxt());

        for pair in blocks.windows(2) {
            assert!(!pair[0].overlaps(&pair[1]), "{} overlaps {}", pair[0], pair[1]);
            assert_eq!(pair[0].maxt() + 1, pair[1].mint(), "gap between blocks");
        }
        for block in &blocks {
            assert!(block.duration_ms() <= plan.block_duration_ms() as u64);
        }
    }

    #[test]
    fn create_block() {
        let minute = MILLIS_PER_MINUTE;

        enum Expected {
            Valid,
            InvalidRange,
            OutOfWindow,
        }

        struct Case {
            name: &'static str,
            mint: i64,
            maxt: i64,
            expected: Expected,
        }

        let cases = [
            Case {
                name: "mint_maxt_same",
                mint: 100 * minute,
                maxt: 100 * minute,
                expected: Expected::Valid,
            },
            Case {
                name: "normal",
                mint: 100 * minute,
                maxt: 100 * minute + 1,
                expected: Expected::Valid,
            },
            Case {
                name: "whole_window",
                mint: 100 * minute,
                maxt: 110 * minute,
                expected: Expected::Valid,
            },
            Case {
                name: "maxt_less_than_mint",
                mint: 100 * minute,
                maxt: 100 * minute - 1,
                expected: Expected::InvalidRange,
            },
            Case {
                name: "mint_less_than_global_mint",
                mint: 100 * minute - 1,
                maxt: 101 * minute,
                expected: Expected::OutOfWindow,
            },
            Case {
                name: "maxt_greater_than_global_maxt",
                mint: 100 * minute,
                maxt: 110 * minute + 1,
                expected: Expected::OutOfWindow,
            },
            Case {
                name: "inverted_and_outside",
                mint: 111 * minute,
                maxt: 99 * minute,
                expected: Expected::OutOfWindow,
            },
        ];

        let plan = make_plan(
            100 * minute,
            110 * minute,
            BlockSize::Duration(10 * minute),
        );

        for case in cases {
            let result = plan.create_block(case.mint, case.maxt);
            match (case.expected, result) {
                (Expected::Valid, Ok(block)) => {
                    assert_eq!(block.mint(), case.mint, "{}", case.name);
                    assert_eq!(block.maxt(), case.maxt, "{}", case.name);
                }
                (Expected::InvalidRange, Err(PlanError::InvalidRange { .. })) => {}
                (Expected::OutOfWindow, Err(PlanError::OutOfWindow { .. })) => {}
                (_, result) => panic!("{}: unexpected result {result:?}", case.name),
            }
        }
    }

    #[test]
    fn whole_window_block_size_yields_single_block() {
        let minute = MILLIS_PER_MINUTE;
        let plan = make_plan(100 * minute, 110 * minute, BlockSize::Duration(10 * minute));
        let blocks: Vec<_> = plan.blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].mint(), 100 * minute);
        assert_eq!(blocks[0].maxt(), 110 * minute);
    }

    #[test]
    fn partitions_with_partial_tail() {
        let plan = make_plan(0, 10, BlockSize::Duration(5));
        let blocks: Vec<_> = plan.blocks().map(|b| (b.mint(), b.maxt())).collect();
        assert_eq!(blocks, vec![(0, 5), (6, 10)]);
        assert_partition(&plan);
    }

    #[test]
    fn tail_may_be_a_single_instant() {
        let plan = make_plan(0, 12, BlockSize::Duration(5));
        let blocks: Vec<_> = plan.blocks().map(|b| (b.mint(), b.maxt())).collect();
        assert_eq!(blocks, vec![(0, 5), (6, 11), (12, 12)]);
        assert_partition(&plan);
    }

    #[test]
    fn zero_width_window_yields_one_block() {
        let plan = make_plan(42, 42, BlockSize::Duration(1_000));
        let blocks: Vec<_> = plan.blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].mint(), blocks[0].maxt()), (42, 42));
    }

    #[test]
    fn partitions_are_exhaustive_over_many_shapes() {
        for (mint, maxt) in [(0, 0), (-50, 50), (1, 1_000), (7, 8), (-1_000, -1)] {
            for size in [1, 2, 3, 7, 10, 99, 1_000, 5_000] {
                assert_partition(&make_plan(mint, maxt, BlockSize::Duration(size)));
            }
            for count in [1, 2, 3, 10, 10_000] {
                assert_partition(&make_plan(mint, maxt, BlockSize::Count(count)));
            }
        }
    }

    #[test]
    fn count_policy_caps_number_of_blocks() {
        let plan = make_plan(0, 10, BlockSize::Count(2));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.block_duration_ms(), 5);

        let plan = make_plan(0, 99, BlockSize::Count(4));
        assert_eq!(plan.len(), 4);
        assert!(plan.blocks().all(|b| b.duration_ms() == 24));

        // Fewer instants than requested blocks: one block per instant.
        let plan = make_plan(0, 2, BlockSize::Count(10));
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn rejects_degenerate_block_sizes() {
        let window = Window::new(0, 10).unwrap();
        assert!(matches!(
            Plan::new(window, BlockSize::Duration(0)),
            Err(PlanError::InvalidBlockSize(_))
        ));
        assert!(matches!(
            Plan::new(window, BlockSize::Count(0)),
            Err(PlanError::InvalidBlockSize(_))
        ));
    }

    #[test]
    fn regeneration_is_deterministic() {
        let plan = make_plan(-3_600_000, 86_400_000, BlockSize::Duration(3_600_000));
        let first: Vec<_> = plan.blocks().collect();
        let second: Vec<_> = plan.blocks().collect();
        assert_eq!(first, second);

        let rebuilt = Plan::new(plan.window(), plan.block_size()).unwrap();
        assert_eq!(rebuilt.hash(), plan.hash());
        assert_eq!(rebuilt.blocks().collect::<Vec<_>>(), first);
    }

    #[test]
    fn resumes_from_any_index() {
        let plan = make_plan(0, 100, BlockSize::Duration(9));
        let all: Vec<_> = plan.blocks().collect();
        let tail: Vec<_> = plan.blocks_from(4).collect();
        assert_eq!(tail, all[4..]);
        assert_eq!(plan.blocks_from(plan.len() + 5).count(), 0);

        let mut blocks = plan.blocks();
        assert_eq!(blocks.nth(3), Some(all[3]));
        assert_eq!(blocks.position(), 4);
        assert_eq!(blocks.len(), all.len() - 4);
    }

    #[test]
    fn index_of_recognizes_only_plan_blocks() {
        let plan = make_plan(0, 100, BlockSize::Duration(9));
        for (i, block) in plan.blocks().enumerate() {
            assert_eq!(plan.index_of(&block), Some(i as u64));
        }

        let adhoc = plan.create_block(1, 10).unwrap();
        assert_eq!(plan.index_of(&adhoc), None);
        let truncated = plan.create_block(0, 5).unwrap();
        assert_eq!(plan.index_of(&truncated), None);
    }

    #[test]
    fn hash_tracks_block_sizing() {
        let a = make_plan(0, 100, BlockSize::Duration(9));
        let b = make_plan(0, 100, BlockSize::Duration(10));
        let c = make_plan(0, 100, BlockSize::Count(10));
        assert_ne!(a.hash(), b.hash());
        // Count(10) over 101 instants resolves to the same 10ms duration.
        assert_eq!(b.hash(), c.hash());
    }

    #[test]
    fn extreme_window_does_not_overflow() {
        let plan = make_plan(i64::MIN, i64::MAX, BlockSize::Duration(i64::MAX));
        assert_partition(&plan);
    }
}

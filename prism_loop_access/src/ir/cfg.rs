//! Control-flow queries on a single loop.
//!
//! [`LoopCfg`] answers the shape questions the access analysis asks before it
//! looks at any memory operation: where the backedges come from, which blocks
//! leave the loop, and whether a block dominates the latch.

use super::arena::{BlockId, LoopId};
use super::function::{Function, Loop};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

/// Borrowed view of one loop's control flow.
#[derive(Clone, Copy)]
pub struct LoopCfg<'f> {
    func: &'f Function,
    lp: &'f Loop,
}

impl<'f> LoopCfg<'f> {
    pub fn new(func: &'f Function, id: LoopId) -> Self {
        Self {
            func,
            lp: func.get_loop(id),
        }
    }

    #[inline]
    pub fn header(&self) -> BlockId {
        self.lp.header
    }

    /// Loop blocks with an edge back to the header.
    pub fn back_edge_sources(&self) -> SmallVec<[BlockId; 2]> {
        self.lp
            .blocks
            .iter()
            .copied()
            .filter(|&bb| self.func.block(bb).succs.contains(&self.lp.header))
            .collect()
    }

    pub fn num_back_edges(&self) -> usize {
        self.back_edge_sources().len()
    }

    /// The single block with a backedge, if there is exactly one.
    pub fn latch(&self) -> Option<BlockId> {
        let sources = self.back_edge_sources();
        match sources.as_slice() {
            [latch] => Some(*latch),
            _ => None,
        }
    }

    /// Loop blocks with a successor outside the loop.
    pub fn exiting_blocks(&self) -> SmallVec<[BlockId; 2]> {
        self.lp
            .blocks
            .iter()
            .copied()
            .filter(|&bb| {
                self.func
                    .block(bb)
                    .succs
                    .iter()
                    .any(|succ| !self.lp.contains(*succ))
            })
            .collect()
    }

    /// The single exiting block, if there is exactly one.
    pub fn exiting_block(&self) -> Option<BlockId> {
        let exiting = self.exiting_blocks();
        match exiting.as_slice() {
            [bb] => Some(*bb),
            _ => None,
        }
    }

    /// Whether every path from the header to `target` inside the loop passes
    /// through `dom`.
    ///
    /// Backedges are ignored, so this is dominance in the loop body's acyclic
    /// region, which is what predication cares about.
    pub fn dominates(&self, dom: BlockId, target: BlockId) -> bool {
        assert!(self.lp.contains(dom), "Unknown block used");
        if dom == target || dom == self.lp.header {
            return true;
        }

        let mut visited = FxHashSet::default();
        let mut worklist = vec![self.lp.header];
        visited.insert(self.lp.header);
        while let Some(bb) = worklist.pop() {
            if bb == target {
                return false;
            }
            for &succ in &self.func.block(bb).succs {
                if succ == dom || succ == self.lp.header || !self.lp.contains(succ) {
                    continue;
                }
                if visited.insert(succ) {
                    worklist.push(succ);
                }
            }
        }
        true
    }

    /// Blocks that do not dominate the latch run conditionally.
    pub fn block_needs_predication(&self, bb: BlockId) -> bool {
        match self.latch() {
            Some(latch) => !self.dominates(bb, latch),
            None => true,
        }
    }
}

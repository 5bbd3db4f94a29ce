//! Typed indices into the per-function tables.
//!
//! Every entity of the loop IR (values, blocks, instructions, loops) lives in
//! a `Vec` owned by [`Function`](super::function::Function) and is referred
//! to by a 32-bit index. The phantom parameter keeps the index spaces apart so
//! a `BlockId` can never be used where a `ValueId` is expected.

use std::fmt;
use std::marker::PhantomData;

// =============================================================================
// Typed ID
// =============================================================================

/// A typed index into one of the function's tables.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Create an ID from a raw table index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Id {
            index,
            _marker: PhantomData,
        }
    }

    /// Create an ID for the element at `index` of a table.
    ///
    /// # Panics
    ///
    /// Panics if the table has outgrown the 32-bit index space.
    #[inline]
    pub fn from_usize(index: usize) -> Self {
        let index = u32::try_from(index).expect("IR table exceeds u32::MAX entries");
        Self::new(index)
    }

    /// Raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Index usable for slicing.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

// =============================================================================
// ID Kinds
// =============================================================================

/// Marker for SSA values (arguments, address computations, integers).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueTag {}
/// Marker for basic blocks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockTag {}
/// Marker for instructions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstTag {}
/// Marker for natural loops.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoopTag {}

/// An SSA value.
pub type ValueId = Id<ValueTag>;
/// A basic block.
pub type BlockId = Id<BlockTag>;
/// An instruction, numbered in creation order across the function.
pub type InstId = Id<InstTag>;
/// A natural loop.
pub type LoopId = Id<LoopTag>;

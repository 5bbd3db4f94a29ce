//! Access registry: memory accesses and their program order.

use crate::ir::arena::{InstId, ValueId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// A read or a write through a pointer.
///
/// The same pointer read and written is two accesses, which is what lets
/// `a[i] += x` be analyzed as a read-modify-write of one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemAccess {
    pub ptr: ValueId,
    pub is_write: bool,
}

impl MemAccess {
    #[inline]
    pub const fn read(ptr: ValueId) -> Self {
        Self {
            ptr,
            is_write: false,
        }
    }

    #[inline]
    pub const fn write(ptr: ValueId) -> Self {
        Self {
            ptr,
            is_write: true,
        }
    }
}

/// Program order of every load and store in a loop.
///
/// Each registered instruction gets the next index. An access may occur at
/// several indices when the same pointer is loaded or stored more than once.
#[derive(Debug, Clone, Default)]
pub struct AccessRegistry {
    order: FxHashMap<MemAccess, SmallVec<[u32; 2]>>,
    insts: Vec<InstId>,
}

impl AccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `access`, performed by `inst`, as the next access in program
    /// order. Returns its index.
    pub fn add(&mut self, access: MemAccess, inst: InstId) -> u32 {
        let idx = self.insts.len() as u32;
        self.order.entry(access).or_default().push(idx);
        self.insts.push(inst);
        idx
    }

    /// Program-order indices at which `access` occurs, ascending.
    pub fn indices(&self, access: &MemAccess) -> &[u32] {
        self.order.get(access).map_or(&[], |v| v.as_slice())
    }

    /// Instruction registered at program-order index `idx`.
    #[inline]
    pub fn inst_at(&self, idx: u32) -> InstId {
        self.insts[idx as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}

//! Loop-level IR: values, instructions, blocks and natural loops.
//!
//! This is deliberately a thin model. Values carry just enough structure for
//! the underlying-object resolver (element-pointer bases, selects, casts), and
//! the symbolic form of each address is recorded up front by whoever builds
//! the function, typically [`FunctionBuilder`](super::builder::FunctionBuilder).

use super::arena::{BlockId, InstId, LoopId, ValueId};
use super::types::{MemType, ValueType};
use crate::scev::{AffineEngine, Expr, Poly};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

// =============================================================================
// Values
// =============================================================================

/// How a value is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// Function argument. `noalias` arguments are identified objects.
    Argument { noalias: bool },
    /// Global variable (identified object).
    Global,
    /// Stack allocation (identified object).
    StackSlot,
    /// Loop-invariant integer, e.g. a trip count or a runtime stride.
    Integer,
    /// Integer constant.
    Constant(i64),
    /// Integer extension or truncation.
    IntCast(ValueId),
    /// Address computed from `base`.
    ElementPtr { base: ValueId, in_bounds: bool },
    /// Select/phi over several pointers.
    Select(SmallVec<[ValueId; 2]>),
    /// Value loaded from memory inside the loop.
    Loaded,
}

/// A value and its type.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub name: String,
    pub ty: ValueType,
    pub kind: ValueKind,
}

impl ValueData {
    /// Address computed by an in-bounds element-pointer computation.
    pub fn is_in_bounds_element_ptr(&self) -> bool {
        matches!(self.kind, ValueKind::ElementPtr { in_bounds: true, .. })
    }

    /// Globals, stack slots and `noalias` arguments: storage that nothing
    /// else in the function can point into.
    pub fn is_identified_object(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Global | ValueKind::StackSlot | ValueKind::Argument { noalias: true }
        )
    }
}

// =============================================================================
// Instructions
// =============================================================================

/// Type-based alias analysis tag. Accesses with different tags never alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TbaaTag(pub u32);

/// Ordering constraints on a load or store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessFlags {
    pub volatile: bool,
    pub atomic: bool,
}

impl AccessFlags {
    pub const VOLATILE: AccessFlags = AccessFlags {
        volatile: true,
        atomic: false,
    };
    pub const ATOMIC: AccessFlags = AccessFlags {
        volatile: false,
        atomic: true,
    };

    /// Neither volatile nor atomic.
    #[inline]
    pub fn is_simple(self) -> bool {
        !self.volatile && !self.atomic
    }
}

/// Math intrinsics that at most read the floating-point environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Sqrt,
    Fabs,
    Fma,
    Floor,
    Ceil,
    Sin,
    Cos,
    Exp,
    Log,
    Pow,
}

/// Memory effects of a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryEffects {
    pub reads: bool,
    pub writes: bool,
}

/// What an instruction does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Load {
        ptr: ValueId,
        flags: AccessFlags,
        tbaa: Option<TbaaTag>,
    },
    Store {
        ptr: ValueId,
        flags: AccessFlags,
        tbaa: Option<TbaaTag>,
    },
    Call {
        intrinsic: Option<Intrinsic>,
        effects: MemoryEffects,
    },
    /// Memory fence: orders memory, counts as a write.
    Fence,
    /// Arithmetic and other instructions without memory effects.
    Compute,
}

/// An instruction in a block.
#[derive(Debug, Clone)]
pub struct Inst {
    pub id: InstId,
    pub block: BlockId,
    pub kind: InstKind,
}

impl Inst {
    pub fn may_read_from_memory(&self) -> bool {
        match &self.kind {
            InstKind::Load { .. } => true,
            // Volatile stores are observable reads as well.
            InstKind::Store { flags, .. } => !flags.is_simple(),
            InstKind::Call { effects, .. } => effects.reads,
            InstKind::Fence => true,
            InstKind::Compute => false,
        }
    }

    pub fn may_write_to_memory(&self) -> bool {
        match &self.kind {
            InstKind::Store { .. } => true,
            InstKind::Load { flags, .. } => !flags.is_simple(),
            InstKind::Call { effects, .. } => effects.writes,
            InstKind::Fence => true,
            InstKind::Compute => false,
        }
    }

    /// Address operand of a load or store.
    pub fn pointer_operand(&self) -> Option<ValueId> {
        match &self.kind {
            InstKind::Load { ptr, .. } | InstKind::Store { ptr, .. } => Some(*ptr),
            _ => None,
        }
    }

    pub fn tbaa(&self) -> Option<TbaaTag> {
        match &self.kind {
            InstKind::Load { tbaa, .. } | InstKind::Store { tbaa, .. } => *tbaa,
            _ => None,
        }
    }

    #[inline]
    pub fn is_load(&self) -> bool {
        matches!(self.kind, InstKind::Load { .. })
    }

    #[inline]
    pub fn is_store(&self) -> bool {
        matches!(self.kind, InstKind::Store { .. })
    }
}

// =============================================================================
// Blocks and Loops
// =============================================================================

/// A basic block.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub name: String,
    pub insts: Vec<InstId>,
    pub succs: SmallVec<[BlockId; 2]>,
}

/// A natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    pub name: String,
    pub header: BlockId,
    /// Every block of the loop, sub-loops included, header first.
    pub blocks: Vec<BlockId>,
    pub parent: Option<LoopId>,
    pub children: Vec<LoopId>,
    /// Iterations carry no memory dependences (set by the frontend).
    pub annotated_parallel: bool,
    /// Backedge-taken count, if the trip count is computable.
    pub backedge_taken_count: Option<Poly>,
}

impl Loop {
    #[inline]
    pub fn contains(&self, bb: BlockId) -> bool {
        self.blocks.contains(&bb)
    }

    /// Innermost loops have no sub-loops.
    #[inline]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }
}

// =============================================================================
// Function
// =============================================================================

/// A function with its loops, and the symbolic form of its addresses.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: String,
    pub(crate) values: Vec<ValueData>,
    pub(crate) insts: Vec<Inst>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) loops: Vec<Loop>,
    pub(crate) exprs: FxHashMap<ValueId, Expr>,
}

impl Function {
    #[inline]
    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.as_usize()]
    }

    #[inline]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.as_usize()]
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.as_usize()]
    }

    #[inline]
    pub fn get_loop(&self, id: LoopId) -> &Loop {
        &self.loops[id.as_usize()]
    }

    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    /// Loops without a parent, in creation order.
    pub fn top_level_loops(&self) -> impl Iterator<Item = LoopId> + '_ {
        self.loops
            .iter()
            .enumerate()
            .filter(|(_, l)| l.parent.is_none())
            .map(|(i, _)| LoopId::from_usize(i))
    }

    /// `root` and all loops nested in it, parents before children.
    pub fn loops_depth_first(&self, root: LoopId) -> Vec<LoopId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(lp) = stack.pop() {
            order.push(lp);
            stack.extend(self.get_loop(lp).children.iter().rev().copied());
        }
        order
    }

    /// Element type accessed through pointer `ptr`.
    pub fn pointee(&self, ptr: ValueId) -> Option<&MemType> {
        self.value(ptr).ty.pointee()
    }

    /// Address space of pointer `ptr`.
    pub fn addr_space(&self, ptr: ValueId) -> u32 {
        self.value(ptr).ty.addr_space()
    }

    /// Look through integer casts.
    pub fn strip_integer_cast(&self, mut v: ValueId) -> ValueId {
        while let ValueKind::IntCast(inner) = self.value(v).kind {
            v = inner;
        }
        v
    }

    /// Display name of a value (`%name`).
    pub fn value_name(&self, v: ValueId) -> String {
        format!("%{}", self.value(v).name)
    }
}

impl AffineEngine for Function {
    fn expr_of(&self, value: ValueId) -> Expr {
        if let Some(expr) = self.exprs.get(&value) {
            return expr.clone();
        }
        match &self.value(value).kind {
            ValueKind::Argument { .. }
            | ValueKind::Global
            | ValueKind::StackSlot
            | ValueKind::Integer => Expr::Poly(Poly::var(value)),
            ValueKind::Constant(c) => Expr::constant(*c),
            ValueKind::IntCast(inner) => self.expr_of(*inner),
            ValueKind::ElementPtr { .. } | ValueKind::Select(_) | ValueKind::Loaded => {
                Expr::Unknown
            }
        }
    }

    fn backedge_taken_count(&self, lp: LoopId) -> Option<Poly> {
        self.get_loop(lp).backedge_taken_count.clone()
    }
}

//! Builder for loop-level IR.
//!
//! The builder records the symbolic address of every pointer it creates, so a
//! finished [`Function`] can act as its own affine engine.
//!
//! ```text
//! for (i = 0; i <= n; i++)          let (lp, body) = b.simple_loop("for.body", Some(n));
//!     a[i + 1] = a[i] * 2;          let a = b.noalias_array("a", MemType::I32);
//!                                   let src = b.strided(a, lp, 1, 0);
//!                                   let dst = b.strided(a, lp, 1, 1);
//!                                   b.load(body, src);
//!                                   b.store(body, dst);
//! ```

use super::arena::{BlockId, InstId, LoopId, ValueId};
use super::function::{
    AccessFlags, BasicBlock, Function, Inst, InstKind, Intrinsic, Loop, MemoryEffects, TbaaTag,
    ValueData, ValueKind,
};
use super::types::{MemType, ValueType};
use crate::scev::{AffineEngine, Expr, Poly};

/// Incrementally builds a [`Function`].
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    func: Function,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            func: Function {
                name: name.to_string(),
                ..Function::default()
            },
        }
    }

    /// Finish building.
    pub fn finish(self) -> Function {
        self.func
    }

    /// The function built so far.
    pub fn function(&self) -> &Function {
        &self.func
    }

    fn push_value(&mut self, name: &str, ty: ValueType, kind: ValueKind) -> ValueId {
        let id = ValueId::from_usize(self.func.values.len());
        self.func.values.push(ValueData {
            name: name.to_string(),
            ty,
            kind,
        });
        id
    }

    fn pointee_of(&self, ptr: ValueId) -> MemType {
        self.func
            .pointee(ptr)
            .cloned()
            .unwrap_or_else(|| panic!("{} is not a pointer", self.func.value_name(ptr)))
    }

    fn derived_name(&self, base: ValueId, suffix: &str) -> String {
        format!("{}.{}{}", self.func.value(base).name, suffix, self.func.values.len())
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Array argument that no other pointer can alias.
    pub fn noalias_array(&mut self, name: &str, elem: MemType) -> ValueId {
        self.push_value(name, ValueType::ptr(elem), ValueKind::Argument { noalias: true })
    }

    /// Pointer argument that may alias other arguments.
    pub fn argument(&mut self, name: &str, elem: MemType) -> ValueId {
        self.push_value(name, ValueType::ptr(elem), ValueKind::Argument { noalias: false })
    }

    /// Pointer argument in a given address space.
    pub fn argument_in(&mut self, name: &str, elem: MemType, addr_space: u32, noalias: bool) -> ValueId {
        self.push_value(
            name,
            ValueType::ptr_in(elem, addr_space),
            ValueKind::Argument { noalias },
        )
    }

    pub fn global(&mut self, name: &str, elem: MemType) -> ValueId {
        self.push_value(name, ValueType::ptr(elem), ValueKind::Global)
    }

    pub fn stack_slot(&mut self, name: &str, elem: MemType) -> ValueId {
        self.push_value(name, ValueType::ptr(elem), ValueKind::StackSlot)
    }

    /// Loop-invariant 64-bit integer symbol.
    pub fn integer(&mut self, name: &str) -> ValueId {
        self.push_value(name, ValueType::Int(64), ValueKind::Integer)
    }

    pub fn constant(&mut self, value: i64) -> ValueId {
        self.push_value(&value.to_string(), ValueType::Int(64), ValueKind::Constant(value))
    }

    /// Integer cast of `v`, as produced when a 32-bit stride is widened.
    pub fn int_cast(&mut self, v: ValueId) -> ValueId {
        let name = format!("{}.ext", self.func.value(v).name);
        self.push_value(&name, ValueType::Int(64), ValueKind::IntCast(v))
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    /// General in-bounds address off `base`: element type `elem`, byte
    /// offset `start` from `base` on the first iteration, advancing by
    /// `step` bytes per iteration of `lp`.
    pub fn element_ptr(&mut self, base: ValueId, elem: MemType, lp: LoopId, start: Poly, step: Poly) -> ValueId {
        let addr_space = self.func.addr_space(base);
        let name = self.derived_name(base, "addr");
        let id = self.push_value(
            &name,
            ValueType::ptr_in(elem, addr_space),
            ValueKind::ElementPtr {
                base,
                in_bounds: true,
            },
        );
        let base_expr = match self.func.expr_of(base) {
            Expr::Poly(p) => p,
            _ => Poly::var(base),
        };
        let expr = Expr::add_rec(&base_expr + &start, step, lp);
        self.func.exprs.insert(id, expr);
        id
    }

    /// `&base[stride * i + offset]`, counted in elements of `base`'s type.
    pub fn strided(&mut self, base: ValueId, lp: LoopId, stride: i64, offset: i64) -> ValueId {
        let elem = self.pointee_of(base);
        let size = elem.alloc_size() as i64;
        self.element_ptr(
            base,
            elem,
            lp,
            Poly::constant(offset * size),
            Poly::constant(stride * size),
        )
    }

    /// `&base[s * i + offset]` where `s` is a runtime value.
    pub fn symbolic_strided(&mut self, base: ValueId, lp: LoopId, stride: ValueId, offset: i64) -> ValueId {
        let elem = self.pointee_of(base);
        let size = elem.alloc_size() as i64;
        let symbol = self.func.strip_integer_cast(stride);
        self.element_ptr(
            base,
            elem,
            lp,
            Poly::constant(offset * size),
            Poly::var(symbol).scale(size),
        )
    }

    /// `&base[offset]`, the same address on every iteration.
    pub fn invariant(&mut self, base: ValueId, offset: i64) -> ValueId {
        let elem = self.pointee_of(base);
        let size = elem.alloc_size() as i64;
        let name = self.derived_name(base, "inv");
        let ty = self.func.value(base).ty.clone();
        let id = self.push_value(
            &name,
            ty,
            ValueKind::ElementPtr {
                base,
                in_bounds: true,
            },
        );
        let expr = match self.func.expr_of(base) {
            Expr::Poly(p) => Expr::Poly(&p + &Poly::constant(offset * size)),
            _ => Expr::Unknown,
        };
        self.func.exprs.insert(id, expr);
        id
    }

    /// `&base[idx[i]]`: an address the engine cannot follow.
    pub fn indirect(&mut self, base: ValueId) -> ValueId {
        let name = self.derived_name(base, "gather");
        let ty = self.func.value(base).ty.clone();
        self.push_value(
            &name,
            ty,
            ValueKind::ElementPtr {
                base,
                in_bounds: true,
            },
        )
    }

    /// Select between pointers. The address is not affine.
    pub fn select(&mut self, name: &str, options: &[ValueId]) -> ValueId {
        let ty = self.func.value(options[0]).ty.clone();
        self.push_value(name, ty, ValueKind::Select(options.iter().copied().collect()))
    }

    /// Mark an element pointer as (not) in-bounds.
    pub fn set_in_bounds(&mut self, ptr: ValueId, in_bounds: bool) {
        if let ValueKind::ElementPtr { in_bounds: flag, .. } = &mut self.func.values[ptr.as_usize()].kind {
            *flag = in_bounds;
        }
    }

    /// Record that the address recurrence of `ptr` does not wrap.
    pub fn set_no_wrap(&mut self, ptr: ValueId) {
        if let Some(Expr::AddRec(ar)) = self.func.exprs.get_mut(&ptr) {
            ar.no_wrap = true;
        }
    }

    /// Override the symbolic form of a value.
    pub fn set_expr(&mut self, v: ValueId, expr: Expr) {
        self.func.exprs.insert(v, expr);
    }

    // =========================================================================
    // Control Flow
    // =========================================================================

    pub fn block(&mut self, name: &str) -> BlockId {
        let id = BlockId::from_usize(self.func.blocks.len());
        self.func.blocks.push(BasicBlock {
            name: name.to_string(),
            ..BasicBlock::default()
        });
        id
    }

    pub fn edge(&mut self, from: BlockId, to: BlockId) {
        self.func.blocks[from.as_usize()].succs.push(to);
    }

    /// Register a loop over existing blocks.
    pub fn add_loop(&mut self, name: &str, header: BlockId, blocks: &[BlockId], backedge_taken_count: Option<Poly>) -> LoopId {
        let id = LoopId::from_usize(self.func.loops.len());
        let mut all = Vec::with_capacity(blocks.len() + 1);
        all.push(header);
        all.extend(blocks.iter().copied().filter(|&bb| bb != header));
        self.func.loops.push(Loop {
            name: name.to_string(),
            header,
            blocks: all,
            parent: None,
            children: Vec::new(),
            annotated_parallel: false,
            backedge_taken_count,
        });
        id
    }

    /// Single-block, bottom-tested loop. Returns the loop and its body.
    pub fn simple_loop(&mut self, name: &str, backedge_taken_count: Option<Poly>) -> (LoopId, BlockId) {
        let body = self.block(name);
        let exit = self.block(&format!("{name}.exit"));
        self.edge(body, body);
        self.edge(body, exit);
        (self.add_loop(name, body, &[body], backedge_taken_count), body)
    }

    /// Make `child` a sub-loop of `parent`.
    pub fn nest(&mut self, child: LoopId, parent: LoopId) {
        self.func.loops[child.as_usize()].parent = Some(parent);
        self.func.loops[parent.as_usize()].children.push(child);
    }

    pub fn mark_parallel(&mut self, lp: LoopId) {
        self.func.loops[lp.as_usize()].annotated_parallel = true;
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    fn push_inst(&mut self, bb: BlockId, kind: InstKind) -> InstId {
        let id = InstId::from_usize(self.func.insts.len());
        self.func.insts.push(Inst { id, block: bb, kind });
        self.func.blocks[bb.as_usize()].insts.push(id);
        id
    }

    pub fn load(&mut self, bb: BlockId, ptr: ValueId) -> InstId {
        self.load_with(bb, ptr, AccessFlags::default(), None)
    }

    pub fn load_with(&mut self, bb: BlockId, ptr: ValueId, flags: AccessFlags, tbaa: Option<TbaaTag>) -> InstId {
        self.push_inst(bb, InstKind::Load { ptr, flags, tbaa })
    }

    pub fn store(&mut self, bb: BlockId, ptr: ValueId) -> InstId {
        self.store_with(bb, ptr, AccessFlags::default(), None)
    }

    pub fn store_with(&mut self, bb: BlockId, ptr: ValueId, flags: AccessFlags, tbaa: Option<TbaaTag>) -> InstId {
        self.push_inst(bb, InstKind::Store { ptr, flags, tbaa })
    }

    pub fn call(&mut self, bb: BlockId, intrinsic: Option<Intrinsic>, effects: MemoryEffects) -> InstId {
        self.push_inst(bb, InstKind::Call { intrinsic, effects })
    }

    pub fn fence(&mut self, bb: BlockId) -> InstId {
        self.push_inst(bb, InstKind::Fence)
    }

    pub fn compute(&mut self, bb: BlockId) -> InstId {
        self.push_inst(bb, InstKind::Compute)
    }
}
